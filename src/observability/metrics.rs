use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_created_total: IntCounterVec,
    pub accept_attempts_total: IntCounterVec,
    pub events_published_total: IntCounterVec,
    pub open_requests: IntGauge,
    pub connected_clients: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_created_total = IntCounterVec::new(
            Opts::new("requests_created_total", "Service requests created by category"),
            &["category"],
        )
        .expect("valid requests_created_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Events published by kind and channel"),
            &["kind", "channel"],
        )
        .expect("valid events_published_total metric");

        let open_requests = IntGauge::new("open_requests", "Requests not yet completed or cancelled")
            .expect("valid open_requests metric");

        let connected_clients =
            IntGauge::new("connected_clients", "Currently joined realtime clients")
                .expect("valid connected_clients metric");

        registry
            .register(Box::new(requests_created_total.clone()))
            .expect("register requests_created_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(open_requests.clone()))
            .expect("register open_requests");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("register connected_clients");

        Self {
            registry,
            requests_created_total,
            accept_attempts_total,
            events_published_total,
            open_requests,
            connected_clients,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
