pub mod admin_service;
pub mod http;
pub mod metrics_defs;

// Re-exported for the metric macros so callers don't need their own dependency.
pub use metrics;
