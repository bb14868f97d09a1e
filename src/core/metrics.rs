use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn submission(outcome: &'static str) {
    metrics::counter!("submissions_total", "outcome" => outcome).increment(1);
}

pub(crate) fn grading_claim(outcome: &'static str) {
    metrics::counter!("grading_claims_total", "outcome" => outcome).increment(1);
}

pub(crate) fn score_recorded() {
    metrics::counter!("scores_total").increment(1);
}

pub(crate) fn late_days_spent(days: i32) {
    metrics::counter!("late_days_spent_total").increment(u64::try_from(days).unwrap_or(0));
}

pub(crate) fn storage_conflict() {
    metrics::counter!("storage_conflicts_total").increment(1);
}
