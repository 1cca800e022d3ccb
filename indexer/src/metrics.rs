//! Minimal counter set for the read service (SPEC_FULL A.4): a deliberate
//! scale-down of the teacher's `metrics::prometheus` registry to the three
//! counters this system needs, via the `metrics` crate's facade and
//! `metrics-exporter-prometheus`'s text renderer instead of wiring
//! `prometheus::Registry` directly.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const EVENTS_PROJECTED: &str = "events_projected_total";
const EVENTS_FAILED: &str = "events_failed_total";
const MATERIALIZATIONS_RUN: &str = "materializations_run_total";

/// Installs the process-global recorder and returns the handle `/metrics`
/// renders from. Call once at startup, before any counter is touched.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder")
}

pub fn inc_events_projected() {
    metrics::counter!(EVENTS_PROJECTED).increment(1);
}

pub fn inc_events_failed() {
    metrics::counter!(EVENTS_FAILED).increment(1);
}

pub fn inc_materializations_run() {
    metrics::counter!(MATERIALIZATIONS_RUN).increment(1);
}
