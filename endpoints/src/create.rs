use crate::errors::Result;
use crate::metrics_defs::ENDPOINT_CREATED;
use crate::rollout::Clock;
use crate::storage::{Key, Store, save_typed};
use crate::types::{ENDPOINT_KIND, Endpoint};
use crate::validation::CreateRequest;
use shared::counter;

/// Persists a new endpoint with its rollout window starting now.
///
/// An existing endpoint with the same name is overwritten, matching the
/// store's save semantics. Deploy pipelines rely on re-running a first
/// deploy being harmless.
pub async fn create(store: &dyn Store, clock: &dyn Clock, request: CreateRequest) -> Result<Endpoint> {
    let endpoint = Endpoint {
        color: request.color,
        urls: request.urls,
        duration: request.duration,
        updated_at: clock.now(),
    };

    let key = Key::new(request.namespace.as_str(), ENDPOINT_KIND, request.name.as_str());
    save_typed(store, &key, &endpoint).await?;

    counter!(ENDPOINT_CREATED).increment(1);
    tracing::info!(%key, color = %endpoint.color, duration = endpoint.duration, "created endpoint");
    Ok(endpoint)
}
