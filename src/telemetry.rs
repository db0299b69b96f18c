//! Telemetry metric name constants.
//!
//! Centralised metric names for routing and transfer operations. Consumers
//! install their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `pelican_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: filesystem operation (e.g. "cat_file", "info", "ls")
//! - `status`: outcome: "ok" or "error"
//! - `kind`: director request kind: "metadata", "cache", "origin", "dirlist"

/// Total filesystem operations dispatched through the failover executor.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const OPERATIONS_TOTAL: &str = "pelican_operations_total";

/// Operation duration in seconds, including resolution.
///
/// Labels: `operation`.
pub const OPERATION_DURATION_SECONDS: &str = "pelican_operation_duration_seconds";

/// Total requests made to the federation discovery endpoint and the director.
///
/// Labels: `kind`, `status`.
pub const DISCOVERIES_TOTAL: &str = "pelican_discoveries_total";

/// Total cache liveness probes.
///
/// Labels: `status`.
pub const PROBES_TOTAL: &str = "pelican_probes_total";

/// Total caches removed from a namespace's preference list after a failure.
pub const CACHES_MARKED_BAD_TOTAL: &str = "pelican_caches_marked_bad_total";

/// Total namespace registry lookups that produced a usable cache.
pub const NAMESPACE_CACHE_HITS_TOTAL: &str = "pelican_namespace_cache_hits_total";

/// Total namespace registry lookups that required discovery.
pub const NAMESPACE_CACHE_MISSES_TOTAL: &str = "pelican_namespace_cache_misses_total";
