use crate::auth::Authorizer;
use crate::config::Listener as ListenerConfig;
use crate::directory::DirectoryCache;
use crate::errors::{ErrorBody, ServiceError};
use crate::rollout::Clock;
use crate::storage::{Store, StoreError};
use crate::types::{DirectoryEntry, Endpoint, NextColor};
use crate::validation::{ValidationError, Validator, parse_json};
use crate::{create, flip, next_color};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

const API_VERSION: &str = env!("CARGO_PKG_VERSION");

const CREATE_DOMAIN: &str = "createEndpoint";
const FLIP_DOMAIN: &str = "flipEndpoint";
const DIRECTORY_DOMAIN: &str = "getEndpoints";
const NEXT_COLOR_DOMAIN: &str = "getNextColor";

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub directory: DirectoryCache,
    pub authorizer: Authorizer,
    pub validator: Arc<Validator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/endpoints", get(directory_handler).post(create_handler))
        .route("/endpoints/flip", post(flip_handler))
        .route("/endpoints/next-color", get(next_color_handler))
        .with_state(state)
}

pub async fn serve(listener: &ListenerConfig, state: ApiState) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "serving endpoint api");
    axum::serve(listener, app).await
}

/// Response envelope shared by every route.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    api_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

struct ApiResponse<T> {
    status: StatusCode,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            data,
        }
    }

    fn created(data: T) -> Self {
        ApiResponse {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            api_version: API_VERSION,
            data: Some(self.data),
            error: None,
        };
        (self.status, Json(body)).into_response()
    }
}

/// A failed operation together with the name the error body reports it under.
struct ApiError {
    domain: &'static str,
    error: ServiceError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            api_version: API_VERSION,
            data: None,
            error: Some(self.error.to_body(self.domain)),
        };
        (self.error.status(), Json(body)).into_response()
    }
}

fn in_domain<E: Into<ServiceError>>(domain: &'static str) -> impl FnOnce(E) -> ApiError {
    move |error| ApiError {
        domain,
        error: error.into(),
    }
}

#[derive(Serialize)]
struct EndpointData {
    name: String,
    #[serde(flatten)]
    endpoint: Endpoint,
}

async fn create_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<EndpointData>, ApiError> {
    let err = in_domain::<ServiceError>(CREATE_DOMAIN);
    let result = async {
        state.authorizer.authorize(&headers).await?;
        let request = state.validator.create(&parse_json(&body)?)?;
        let name = request.name.clone();
        let endpoint = create::create(state.store.as_ref(), state.clock.as_ref(), request).await?;
        Ok::<_, ServiceError>(EndpointData { name, endpoint })
    };
    result.await.map(ApiResponse::created).map_err(err)
}

async fn flip_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<EndpointData>, ApiError> {
    let err = in_domain::<ServiceError>(FLIP_DOMAIN);
    let result = async {
        state.authorizer.authorize(&headers).await?;
        let request = state.validator.flip(&parse_json(&body)?)?;
        let name = request.name.clone();
        let endpoint = flip::flip(state.store.as_ref(), state.clock.as_ref(), request).await?;
        Ok::<_, ServiceError>(EndpointData { name, endpoint })
    };
    result.await.map(ApiResponse::ok).map_err(err)
}

#[derive(Deserialize, Debug)]
struct DirectoryParams {
    environment: Option<String>,
}

#[derive(Serialize)]
struct LastUpdated {
    utc: DateTime<Utc>,
    friendly: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryData {
    endpoints: HashMap<String, DirectoryEntry>,
    last_updated: LastUpdated,
}

async fn directory_handler(
    State(state): State<ApiState>,
    Query(params): Query<DirectoryParams>,
) -> Result<ApiResponse<DirectoryData>, ApiError> {
    let namespace = state
        .validator
        .directory(params.environment.as_deref())
        .map_err(in_domain::<ValidationError>(DIRECTORY_DOMAIN))?;
    let directory = state
        .directory
        .get(&namespace)
        .await
        .map_err(in_domain::<StoreError>(DIRECTORY_DOMAIN))?;

    let age = state.clock.now().signed_duration_since(directory.last_updated);
    Ok(ApiResponse::ok(DirectoryData {
        endpoints: directory.entries,
        last_updated: LastUpdated {
            utc: directory.last_updated,
            friendly: time_ago(age),
        },
    }))
}

#[derive(Deserialize, Debug)]
struct NextColorParams {
    name: Option<String>,
    environment: Option<String>,
}

async fn next_color_handler(
    State(state): State<ApiState>,
    Query(params): Query<NextColorParams>,
) -> Result<ApiResponse<NextColor>, ApiError> {
    let request = state
        .validator
        .next_color(params.name.as_deref(), params.environment.as_deref())
        .map_err(in_domain::<ValidationError>(NEXT_COLOR_DOMAIN))?;
    next_color::next_color(state.store.as_ref(), &request)
        .await
        .map(ApiResponse::ok)
        .map_err(in_domain::<ServiceError>(NEXT_COLOR_DOMAIN))
}

/// Human readable age, e.g. "3 minutes ago".
fn time_ago(age: chrono::Duration) -> String {
    let secs = age.num_seconds();
    if secs < 1 {
        return "just now".into();
    }

    let (value, unit) = match secs {
        s if s < 60 => (s, "second"),
        s if s < 3600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3600, "hour"),
        s => (s / 86_400, "day"),
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{value} {unit}{plural} ago")
}
