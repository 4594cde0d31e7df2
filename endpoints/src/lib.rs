//! Blue/green endpoint tracking.
//!
//! Records two candidate URLs per endpoint, tracks which color is live and
//! hands out a weighted choice between the old and the new color while a
//! rollout window is open.

pub mod api;
pub mod auth;
pub mod config;
pub mod create;
pub mod directory;
pub mod errors;
pub mod flip;
pub mod metrics_defs;
pub mod next_color;
pub mod rollout;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testutils;

use api::ApiState;
use auth::Authorizer;
use directory::DirectoryCache;
use rollout::{SystemClock, ThreadRandom};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use types::Namespace;
use validation::Validator;

const WARMUP_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum EndpointsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] storage::StoreError),
    #[error("invalid config: {0}")]
    Config(#[from] config::ConfigError),
}

/// Serves the endpoint API and the admin listener until either fails.
pub async fn run(config: config::Config) -> Result<(), EndpointsError> {
    config.validate()?;

    let store = storage::get_store(&config.store)?;
    let clock = Arc::new(SystemClock);
    let directory = DirectoryCache::new(
        store.clone(),
        clock.clone(),
        Arc::new(ThreadRandom),
        Duration::from_secs(config.directory_ttl_secs),
    );

    let state = ApiState {
        store: store.clone(),
        clock,
        directory: directory.clone(),
        authorizer: Authorizer::new(store),
        validator: Arc::new(Validator::new(config.environments.clone())),
    };

    let ready = Arc::new(AtomicBool::new(false));
    tokio::spawn(warm_up(directory, config.environments.clone(), ready.clone()));

    let api_task = async {
        api::serve(&config.listener, state).await?;
        Ok::<_, EndpointsError>(())
    };
    let admin: AdminService<_, EndpointsError> =
        AdminService::new(move || ready.load(Ordering::Relaxed));
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin,
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

/// Builds the directory of every namespace once so the first client requests
/// hit a warm cache. Readiness is reported after this succeeds.
async fn warm_up(directory: DirectoryCache, environments: Vec<String>, ready: Arc<AtomicBool>) {
    let namespaces: Vec<Namespace> = std::iter::once(None)
        .chain(environments.iter().map(|env| Some(env.as_str())))
        .map(Namespace::for_environment)
        .collect();

    loop {
        let mut failed = false;
        for namespace in &namespaces {
            if let Err(err) = directory.get(namespace).await {
                tracing::error!(%namespace, "directory warm-up failed: {err}");
                failed = true;
            }
        }
        if !failed {
            break;
        }
        tokio::time::sleep(WARMUP_RETRY_DELAY).await;
    }

    ready.store(true, Ordering::Relaxed);
    tracing::info!(namespaces = namespaces.len(), "directory warm, ready to serve");
}
