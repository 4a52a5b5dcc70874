//! Prometheus metrics registry (`GET /metrics`, SPEC_FULL.md component 12).

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Process-wide metrics, registered once at startup and scraped by the
/// `/metrics` handler.
pub struct Metrics {
    registry: Registry,
    pub runs_started_total: IntCounter,
    pub runs_failed_total: IntCounter,
    pub run_in_progress: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let runs_started_total = IntCounter::new(
            "pbsflow_runs_started_total",
            "Number of workflow runs accepted by the run manager",
        )
        .expect("metric name/help are static and valid");
        let runs_failed_total = IntCounter::new(
            "pbsflow_runs_failed_total",
            "Number of workflow runs that finished with an error",
        )
        .expect("metric name/help are static and valid");
        let run_in_progress = IntGauge::new(
            "pbsflow_run_in_progress",
            "1 while a workflow run is executing, 0 otherwise",
        )
        .expect("metric name/help are static and valid");

        registry
            .register(Box::new(runs_started_total.clone()))
            .expect("registration of a metric only defined once cannot collide");
        registry
            .register(Box::new(runs_failed_total.clone()))
            .expect("registration of a metric only defined once cannot collide");
        registry
            .register(Box::new(run_in_progress.clone()))
            .expect("registration of a metric only defined once cannot collide");

        Self {
            registry,
            runs_started_total,
            runs_failed_total,
            run_in_progress,
        }
    }

    /// Render the current metric snapshot in Prometheus text exposition
    /// format.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .expect("text encoding of gathered metric families cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoder always emits valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.runs_started_total.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("pbsflow_runs_started_total"));
        assert!(rendered.contains('1'));
    }
}
