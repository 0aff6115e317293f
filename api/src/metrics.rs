use prometheus::{IntCounterVec, Opts, Registry};

/// Outbound request counters for the HTTP client.
pub struct RequestMetrics {
    requests: IntCounterVec,
}

impl RequestMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new(
                "http_requests_total",
                "Outbound API requests by endpoint and result.",
            ),
            &["endpoint", "result"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        Ok(Self { requests })
    }

    pub fn observe(&self, endpoint: &str, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.requests.with_label_values(&[endpoint, result]).inc();
    }
}
