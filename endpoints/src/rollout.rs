//! Linear traffic ramp between the previous and the canonical color.
//!
//! At the start of the rollout window no request gets the canonical URL. The
//! share grows linearly with elapsed time and reaches 100% once the window
//! has passed.

use crate::types::{DirectoryEntry, Endpoint};
use chrono::{DateTime, Utc};

/// Source of "now". Injected so rollout and cache expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn draw(&self) -> f64;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Picks the URL a single request receives.
///
/// `draw` must be in `[0, 1)`. The canonical URL is returned when
/// `draw < elapsed / duration`; the fraction is not clamped, so after the
/// window closes the canonical URL is certain and before it opens (clock
/// skew) the previous URL is.
pub fn resolve_url(endpoint: &Endpoint, now: DateTime<Utc>, draw: f64) -> &str {
    if endpoint.duration == 0 {
        return endpoint.freshest();
    }

    let elapsed = elapsed_secs(endpoint.updated_at, now);
    let fraction = elapsed / endpoint.duration as f64;

    if draw < fraction {
        endpoint.freshest()
    } else {
        endpoint.previous()
    }
}

/// Directory entry for `endpoint`, spending one draw from `random`.
pub fn directory_entry(
    endpoint: &Endpoint,
    now: DateTime<Utc>,
    random: &dyn RandomSource,
) -> DirectoryEntry {
    DirectoryEntry {
        url: resolve_url(endpoint, now, random.draw()).to_string(),
        freshest: endpoint.freshest().to_string(),
    }
}

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let delta = now.signed_duration_since(since);
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        // Beyond ~292k years the microsecond count overflows.
        None => delta.num_seconds() as f64,
    }
}
