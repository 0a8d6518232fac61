//! Prometheus metrics for PO Agreement nodes.
//!
//! All metrics follow the naming convention: `po_<metric>_<unit>`. The
//! protocol counters (`po_sessions_*`, `po_notary_requests_total`,
//! `po_transactions_recorded_total`) are registered by `po-agreement` when
//! built with its `metrics` feature; this module adds node-level metrics and
//! text exposition of the shared registry.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Node build info, always 1
    pub static ref NODE_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("po_node_info", "Node build information"),
        &["service", "version"]
    ).expect("metric creation failed");

    /// Peers known to the node
    pub static ref PEERS_KNOWN: IntGauge = IntGauge::new(
        "po_peers_known",
        "Parties in the identity registry, excluding self and notaries"
    ).expect("metric creation failed");
}

/// Registry shared with `po-agreement`.
pub fn registry() -> &'static Registry {
    prometheus::default_registry()
}

/// Register node metrics with the shared registry.
pub fn register_metrics(service_name: &str) -> Result<(), TelemetryError> {
    for metric in [
        Box::new(NODE_INFO.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(PEERS_KNOWN.clone()),
    ] {
        match registry().register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    NODE_INFO
        .with_label_values(&[service_name, env!("CARGO_PKG_VERSION")])
        .set(1);
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
