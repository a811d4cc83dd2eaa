//! Metrics instrumentation for runtime observability.

/// Record model request latency.
pub fn record_model_latency(duration_ms: f64) {
    metrics::histogram!("model_request_latency", duration_ms);
}

/// Record tool execution latency.
pub fn record_tool_latency(duration_ms: f64) {
    metrics::histogram!("tool_execution_latency", duration_ms);
}

/// Increment tool failure counter (executor errors and unknown tools).
pub fn increment_tool_errors() {
    metrics::counter!("tool_error_count", 1);
}

/// Increment capacity eviction counter.
pub fn increment_session_evictions() {
    metrics::counter!("session_eviction_count", 1);
}

/// Increment TTL expiration counter.
pub fn increment_session_expirations() {
    metrics::counter!("session_expiration_count", 1);
}
