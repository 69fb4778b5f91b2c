//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_rpc_requests_total` (counter): RPC requests by method, outcome;
//!   methods outside [`RPC_METHODS`] share the `unknown` label
//! - `gateway_http_errors_total` (counter): error envelopes by status
//! - `gateway_rpc_active_connections` (gauge): open RPC connections
//! - `gateway_buffers_allocated` / `gateway_buffers_free` (gauges)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::audit::ResourceAccounting;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Methods the RPC listener answers.
pub const RPC_METHODS: [&str; 2] = ["ping", "stat"];

/// Label value for `method`, from a closed set.
pub fn rpc_method_label(method: &str) -> &'static str {
    RPC_METHODS
        .into_iter()
        .find(|known| *known == method)
        .unwrap_or("unknown")
}

pub fn record_rpc_request(method: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "gateway_rpc_requests_total",
        "method" => rpc_method_label(method),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_http_error(status: u16) {
    metrics::counter!("gateway_http_errors_total", "status" => status.to_string()).increment(1);
}

pub fn set_rpc_connections(active: u64) {
    metrics::gauge!("gateway_rpc_active_connections").set(active as f64);
}

pub fn record_buffer_stats(stats: ResourceAccounting) {
    metrics::gauge!("gateway_buffers_allocated").set(stats.allocated as f64);
    metrics::gauge!("gateway_buffers_free").set(stats.free as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_supplied_methods_do_not_become_labels() {
        assert_eq!(rpc_method_label("ping"), "ping");
        assert_eq!(rpc_method_label("stat"), "stat");
        assert_eq!(rpc_method_label("drop-everything"), "unknown");
        assert_eq!(rpc_method_label(&"x".repeat(4096)), "unknown");
    }
}
