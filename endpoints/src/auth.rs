//! Basic-auth check against credentials kept in the store.
//!
//! Credentials live at (`admin`, `Credential`, username) as
//! `{"password": "hmac-sha256$<salt hex>$<mac hex>"}`.

use crate::errors::ServiceError;
use crate::storage::{Key, Store, get_typed};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_NAMESPACE: &str = "admin";
pub const CREDENTIAL_KIND: &str = "Credential";

const SCHEME: &str = "hmac-sha256";
const SALT_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub password: String,
}

impl Credential {
    pub fn key(username: &str) -> Key {
        Key::new(ADMIN_NAMESPACE, CREDENTIAL_KIND, username)
    }

    pub fn from_password(password: &str) -> Self {
        Credential {
            password: hash_password(password),
        }
    }
}

fn mac_for(salt: &[u8], password: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac
}

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    let digest = mac_for(&salt, password).finalize().into_bytes();
    format!("{SCHEME}${}${}", hex::encode(salt), hex::encode(digest))
}

/// Constant-time comparison of `password` against a stored hash.
/// Hashes in an unknown format never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let mut parts = hash.split('$');
    let (Some(SCHEME), Some(salt), Some(digest), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(digest)) = (hex::decode(salt), hex::decode(digest)) else {
        return false;
    };
    mac_for(&salt, password).verify_slice(&digest).is_ok()
}

#[derive(Debug, PartialEq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Extracts the user and password of a `Basic` authorization header.
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn Store>,
}

impl Authorizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Authorizer { store }
    }

    pub async fn authorize(&self, headers: &HeaderMap) -> Result<(), ServiceError> {
        if self.is_valid(headers).await {
            Ok(())
        } else {
            Err(ServiceError::Authorization)
        }
    }

    async fn is_valid(&self, headers: &HeaderMap) -> bool {
        let Some(user) = parse_basic_auth(headers) else {
            return false;
        };

        let key = Credential::key(&user.username);
        match get_typed::<Credential>(self.store.as_ref(), &key).await {
            Ok(Some(credential)) => verify_password(&user.password, &credential.password),
            Ok(None) => false,
            Err(err) => {
                // A broken credential store denies access rather than failing the request.
                tracing::error!(username = %user.username, "credential lookup failed: {err}");
                false
            }
        }
    }
}
