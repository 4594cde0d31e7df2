//! Metrics definitions for the endpoint service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const DIRECTORY_CACHE_HIT: MetricDef = MetricDef {
    name: "directory.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of directory requests served from the cache",
};

pub const DIRECTORY_CACHE_MISS: MetricDef = MetricDef {
    name: "directory.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of directory requests that rebuilt the directory from storage",
};

pub const DIRECTORY_REFRESH_DURATION: MetricDef = MetricDef {
    name: "directory.refresh.duration",
    metric_type: MetricType::Histogram,
    description: "Time to rebuild a directory from storage in seconds",
};

pub const DIRECTORY_ENDPOINTS: MetricDef = MetricDef {
    name: "directory.endpoints",
    metric_type: MetricType::Histogram,
    description: "Number of endpoints in a rebuilt directory",
};

pub const ENDPOINT_CREATED: MetricDef = MetricDef {
    name: "endpoint.created",
    metric_type: MetricType::Counter,
    description: "Number of endpoints created or overwritten",
};

pub const ENDPOINT_FLIPPED: MetricDef = MetricDef {
    name: "endpoint.flipped",
    metric_type: MetricType::Counter,
    description: "Number of successful color flips, labelled by the new color",
};

pub const DIRECTORY_CACHED_NAMESPACES: MetricDef = MetricDef {
    name: "directory.cached_namespaces",
    metric_type: MetricType::Gauge,
    description: "Number of namespaces with a cached directory",
};

pub const ALL_METRICS: &[MetricDef] = &[
    DIRECTORY_CACHE_HIT,
    DIRECTORY_CACHE_MISS,
    DIRECTORY_CACHED_NAMESPACES,
    DIRECTORY_REFRESH_DURATION,
    DIRECTORY_ENDPOINTS,
    ENDPOINT_CREATED,
    ENDPOINT_FLIPPED,
];
