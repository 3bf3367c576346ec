//! Build outcome counters.
//!
//! Only counting happens here; the text exposition is rendered on demand for
//! whatever collector scrapes the metrics endpoint.

use cicd_core::BuildOutcome;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    outcomes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "http_requests_total",
                "How many HTTP requests processed, partitioned by status code",
            ),
            &["code"],
        )?;
        let outcomes = IntCounterVec::new(
            Opts::new(
                "build_outcomes_total",
                "How many builds finished, partitioned by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(outcomes.clone()))?;

        Ok(Self {
            registry,
            requests,
            outcomes,
        })
    }

    /// Count one finished build request by the status code it was answered
    /// with and by its outcome.
    pub fn record(&self, code: u16, outcome: BuildOutcome) {
        let code = code.to_string();
        self.requests.with_label_values(&[code.as_str()]).inc();
        self.outcomes.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn requests_with_code(&self, code: u16) -> u64 {
        self.requests
            .with_label_values(&[code.to_string().as_str()])
            .get()
    }

    pub fn builds_with_outcome(&self, outcome: BuildOutcome) -> u64 {
        self.outcomes.with_label_values(&[outcome.as_str()]).get()
    }

    /// Content type of [`Metrics::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render all counters in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
