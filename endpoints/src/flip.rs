use crate::errors::{Result, ServiceError};
use crate::metrics_defs::ENDPOINT_FLIPPED;
use crate::rollout::Clock;
use crate::storage::{Key, Store, get_typed, save_typed};
use crate::types::{Color, ENDPOINT_KIND, Endpoint};
use crate::validation::FlipRequest;
use shared::counter;

/// Makes `request.color` canonical and restarts the rollout window.
///
/// Fetch and save are separate store calls; a concurrent flip of the same
/// endpoint between them is overwritten.
pub async fn flip(store: &dyn Store, clock: &dyn Clock, request: FlipRequest) -> Result<Endpoint> {
    let key = Key::new(request.namespace.as_str(), ENDPOINT_KIND, request.name.as_str());

    let Some(mut endpoint) = get_typed::<Endpoint>(store, &key).await? else {
        return Err(ServiceError::NotFound {
            namespace: request.namespace,
            name: request.name,
        });
    };

    // Re-flipping to the live color would only reset the rollout clock.
    if endpoint.color == request.color {
        return Err(ServiceError::Conflict {
            namespace: request.namespace,
            name: request.name,
            color: request.color,
        });
    }

    let previous = endpoint.color;
    if let Some(url) = request.urls.blue {
        endpoint.urls.set(Color::Blue, url);
    }
    if let Some(url) = request.urls.green {
        endpoint.urls.set(Color::Green, url);
    }
    endpoint.color = request.color;
    endpoint.duration = request.duration;
    endpoint.updated_at = clock.now();

    save_typed(store, &key, &endpoint).await?;

    counter!(ENDPOINT_FLIPPED, "color" => endpoint.color.as_str()).increment(1);
    tracing::info!(
        %key,
        from = %previous,
        to = %endpoint.color,
        duration = endpoint.duration,
        "flipped endpoint"
    );
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ManualClock, seed_endpoint, t0};
    use crate::storage::MemoryStore;
    use crate::types::Namespace;
    use crate::validation::UrlOverrides;
    use chrono::Duration;

    fn request(name: &str, color: Color, duration: u64) -> FlipRequest {
        FlipRequest {
            namespace: Namespace::for_environment(Some("staging")),
            name: name.into(),
            color,
            duration,
            urls: UrlOverrides::default(),
        }
    }

    async fn seeded() -> (MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let ns = Namespace::for_environment(Some("staging"));
        seed_endpoint(&store, &ns, "svc", Color::Blue, 3600, t0()).await;
        (store, ManualClock::new(t0() + Duration::seconds(7200)))
    }

    #[tokio::test]
    async fn test_flip() {
        let (store, clock) = seeded().await;

        let flipped = flip(&store, &clock, request("svc", Color::Green, 120)).await.unwrap();
        assert_eq!(flipped.color, Color::Green);
        assert_eq!(flipped.duration, 120);
        assert_eq!(flipped.updated_at, clock.now());
        assert_eq!(flipped.urls.blue, "https://blue.svc");
        assert_eq!(flipped.urls.green, "https://green.svc");

        let key = Key::new("staging-deployments", ENDPOINT_KIND, "svc");
        let stored: Endpoint = get_typed(&store, &key).await.unwrap().unwrap();
        assert_eq!(stored, flipped);
    }

    #[tokio::test]
    async fn test_flip_overlays_urls() {
        let (store, clock) = seeded().await;
        let mut req = request("svc", Color::Green, 60);
        req.urls.green = Some("https://green-v2.svc".into());

        let flipped = flip(&store, &clock, req).await.unwrap();
        assert_eq!(flipped.urls.green, "https://green-v2.svc");
        assert_eq!(flipped.urls.blue, "https://blue.svc");
        assert_eq!(flipped.freshest(), "https://green-v2.svc");
    }

    #[tokio::test]
    async fn test_flip_to_active_color_conflicts() {
        let (store, clock) = seeded().await;

        for duration in [0, 60, 3600] {
            let err = flip(&store, &clock, request("svc", Color::Blue, duration))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Conflict { color: Color::Blue, .. }));
        }

        // the record is untouched
        let key = Key::new("staging-deployments", ENDPOINT_KIND, "svc");
        let stored: Endpoint = get_typed(&store, &key).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, t0());
        assert_eq!(stored.duration, 3600);
    }

    #[tokio::test]
    async fn test_flip_unknown_endpoint() {
        let (store, clock) = seeded().await;

        for color in Color::ALL {
            let err = flip(&store, &clock, request("missing", color, 60))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound { ref name, .. } if name == "missing"));
        }
    }

    #[tokio::test]
    async fn test_flip_is_scoped_to_namespace() {
        let (store, clock) = seeded().await;
        let mut req = request("svc", Color::Green, 60);
        req.namespace = Namespace::for_environment(Some("prod"));

        let err = flip(&store, &clock, req).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
