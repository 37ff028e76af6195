use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

pub const DEPLOYMENT_SUCCESS: &str = "success";
pub const DEPLOYMENT_FAILED: &str = "failed";

/// Control-plane counters, labelled per function.
pub struct ApiMetrics {
    registry: Registry,
    deployments: IntCounterVec,
    invocations: IntCounterVec,
    duration: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let deployments = IntCounterVec::new(
            Opts::new(
                "function_deployments_total",
                "Total number of function deployments",
            ),
            &["function", "status"],
        )?;
        let invocations = IntCounterVec::new(
            Opts::new(
                "function_invocations_total",
                "Total number of function invocations",
            ),
            &["function"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "function_duration_seconds",
                "Function execution duration in seconds",
            ),
            &["function"],
        )?;

        registry.register(Box::new(deployments.clone()))?;
        registry.register(Box::new(invocations.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            deployments,
            invocations,
            duration,
        })
    }

    /// Counts a create or update attempt.
    pub fn record_deployment(&self, function: &str, succeeded: bool) {
        let status = if succeeded {
            DEPLOYMENT_SUCCESS
        } else {
            DEPLOYMENT_FAILED
        };
        self.deployments.with_label_values(&[function, status]).inc();
    }

    pub fn record_invocation(&self, function: &str) {
        self.invocations.with_label_values(&[function]).inc();
    }

    pub fn observe_duration(&self, function: &str, duration: Duration) {
        self.duration
            .with_label_values(&[function])
            .observe(duration.as_secs_f64());
    }

    pub fn deployments(&self, function: &str, status: &str) -> u64 {
        self.deployments.with_label_values(&[function, status]).get()
    }

    pub fn invocations(&self, function: &str) -> u64 {
        self.invocations.with_label_values(&[function]).get()
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_function() {
        let metrics = ApiMetrics::new().unwrap();

        metrics.record_deployment("f1", true);
        metrics.record_deployment("f1", false);
        metrics.record_deployment("f1", true);
        metrics.record_invocation("f2");
        metrics.observe_duration("f2", Duration::from_millis(20));

        assert_eq!(metrics.deployments("f1", DEPLOYMENT_SUCCESS), 2);
        assert_eq!(metrics.deployments("f1", DEPLOYMENT_FAILED), 1);
        assert_eq!(metrics.invocations("f2"), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"function_deployments_total{function="f1",status="success"} 2"#));
        assert!(text.contains(r#"function_duration_seconds_count{function="f2"} 1"#));
    }
}
