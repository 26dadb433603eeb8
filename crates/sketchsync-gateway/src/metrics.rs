//! Prometheus metrics recording and endpoint.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder and return the handle for rendering.
///
/// The recorder is process-global; later calls return the first handle.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(HANDLE.get_or_init(|| handle).clone())
}

/// Record a new WebSocket connection.
pub fn record_connect() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

/// Record a WebSocket disconnection.
pub fn record_disconnect() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

/// Record one inbound command by name.
pub fn record_command(command: &str) {
    let labels = [("command", command.to_string())];
    metrics::counter!("sync_commands_total", &labels).increment(1);
}

/// Record broadcast destinations that could not take a frame.
pub fn record_delivery_failures(count: usize) {
    if count > 0 {
        metrics::counter!("sync_delivery_failures_total").increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_command_does_not_panic() {
        // The metrics crate falls back to a no-op recorder when none is installed.
        record_command("line");
        record_command("unknown-thing");
    }

    #[test]
    fn test_connection_gauges_do_not_panic() {
        record_connect();
        record_disconnect();
    }

    #[test]
    fn test_delivery_failures_do_not_panic() {
        record_delivery_failures(0);
        record_delivery_failures(3);
    }
}
