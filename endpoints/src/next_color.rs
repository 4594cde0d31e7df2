use crate::errors::Result;
use crate::storage::{Key, Store, get_typed};
use crate::types::{Color, ENDPOINT_KIND, Endpoint, NextColor};
use crate::validation::NextColorRequest;

/// Color slot the next deploy of an endpoint should target.
///
/// Always the inactive slot, so a deploy never replaces the live URL. A first
/// deploy goes to blue.
pub async fn next_color(store: &dyn Store, request: &NextColorRequest) -> Result<NextColor> {
    let key = Key::new(request.namespace.as_str(), ENDPOINT_KIND, request.name.as_str());
    let next = match get_typed::<Endpoint>(store, &key).await? {
        None => NextColor {
            is_new: true,
            next_color: Color::Blue,
        },
        Some(endpoint) => NextColor {
            is_new: false,
            next_color: endpoint.color.other(),
        },
    };
    Ok(next)
}
