//! Prometheus metrics exposition
//!
//! - `otp_issued_total` (counter)
//! - `otp_verified_total` (counter): label `result` (`valid`, `invalid`, `error`)
//! - `sessions_issued_total` (counter)
//! - `oauth_handshakes_total` (counter): label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The handle's `render()` method produces the Prometheus text exposition format
/// suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub fn record_otp_issued() {
    metrics::counter!("otp_issued_total").increment(1);
}

/// Record an OTP check. `result` is `valid`, `invalid` or `error`.
pub fn record_otp_verified(result: &'static str) {
    metrics::counter!("otp_verified_total", "result" => result).increment(1);
}

pub fn record_session_issued() {
    metrics::counter!("sessions_issued_total").increment(1);
}

/// Record a finished consent handshake (`success`, `state_mismatch`, `failed`, ...).
pub fn record_handshake(outcome: &'static str) {
    metrics::counter!("oauth_handshakes_total", "outcome" => outcome).increment(1);
}
