use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

struct DispatcherMetrics {
    registry: Registry,
    invocations: IntCounter,
    cold_starts: IntCounter,
    errors: IntCounter,
    duration: Histogram,
    cold_start: IntGauge,
}

impl DispatcherMetrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let invocations =
            IntCounter::new("function_invocations_total", "Total function invocations")?;
        let cold_starts = IntCounter::new("function_cold_starts_total", "Total cold starts")?;
        let errors = IntCounter::new("function_errors_total", "Total failed invocations")?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            "function_duration_seconds",
            "Function execution duration",
        ))?;
        let cold_start = IntGauge::new("function_cold_start", "Cold start indicator")?;

        registry.register(Box::new(invocations.clone()))?;
        registry.register(Box::new(cold_starts.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(cold_start.clone()))?;

        Ok(Self {
            registry,
            invocations,
            cold_starts,
            errors,
            duration,
            cold_start,
        })
    }
}

/// Process-wide state shared by every concurrent invocation.
///
/// The cold-start flag starts set and is cleared exactly once, either by
/// [`DispatcherState::mark_warm`] or by the first [`DispatcherState::take_cold_start`].
pub struct DispatcherState {
    cold_start: AtomicBool,
    metrics: DispatcherMetrics,
}

impl DispatcherState {
    pub fn new() -> Result<Self, prometheus::Error> {
        let metrics = DispatcherMetrics::new()?;
        metrics.cold_start.set(1);

        Ok(Self {
            cold_start: AtomicBool::new(true),
            metrics,
        })
    }

    pub fn is_cold(&self) -> bool {
        self.cold_start.load(Ordering::SeqCst)
    }

    /// Clears the flag after the handler was loaded at startup.
    pub fn mark_warm(&self) {
        self.cold_start.store(false, Ordering::SeqCst);
        self.metrics.cold_start.set(0);
    }

    /// Clears the flag and returns whether this caller was the one to clear it.
    pub fn take_cold_start(&self) -> bool {
        let was_cold = self.cold_start.swap(false, Ordering::SeqCst);
        if was_cold {
            self.metrics.cold_starts.inc();
            self.metrics.cold_start.set(0);
        }
        was_cold
    }

    pub fn record_invocation(&self, duration: Duration, failed: bool) {
        self.metrics.invocations.inc();
        self.metrics.duration.observe(duration.as_secs_f64());
        if failed {
            self.metrics.errors.inc();
        }
    }

    pub fn invocations(&self) -> u64 {
        self.metrics.invocations.get()
    }

    pub fn errors(&self) -> u64 {
        self.metrics.errors.get()
    }

    /// Renders the registry in the Prometheus text format.
    pub fn encode_metrics(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.metrics.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
