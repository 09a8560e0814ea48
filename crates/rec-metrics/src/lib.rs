use std::env;
use std::sync::OnceLock;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

pub const METRICS_PORT_ENV: &str = "REC_METRICS_PORT";
pub const DEFAULT_METRICS_PORT: u16 = 9108;

static EXPORTER_PORT: OnceLock<u16> = OnceLock::new();

/// Port from `port_env`, or `default_port` when unset or unparsable.
pub fn metrics_port(port_env: &str, default_port: u16) -> u16 {
    env::var(port_env)
        .ok()
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Start a Prometheus exporter on `0.0.0.0:<port>` and install it as the
/// global recorder. Later calls return the port already in use.
///
/// Returns `None` when the exporter could not be started; metrics calls are
/// then no-ops and the caller keeps running.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<u16> {
    if let Some(port) = EXPORTER_PORT.get() {
        return Some(*port);
    }

    let port = metrics_port(port_env, default_port);
    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
    {
        Ok(()) => {
            let _ = EXPORTER_PORT.set(port);
            info!(metrics_port = port, "started prometheus exporter");
            EXPORTER_PORT.get().copied()
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to start prometheus exporter");
            None
        }
    }
}
