use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub poll_cycles_total: IntCounterVec,
    pub poll_latency_seconds: HistogramVec,
    pub events_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub active_orders: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let poll_cycles_total = IntCounterVec::new(
            Opts::new("poll_cycles_total", "Total poll cycles by outcome"),
            &["outcome"],
        )
        .expect("valid poll_cycles_total metric");

        let poll_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "poll_latency_seconds",
                "Latency of one poll cycle in seconds",
            ),
            &["outcome"],
        )
        .expect("valid poll_latency_seconds metric");

        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Detected transition events by kind"),
            &["kind"],
        )
        .expect("valid events_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Notification deliveries by sink and outcome",
            ),
            &["sink", "outcome"],
        )
        .expect("valid notifications_total metric");

        let active_orders = IntGaugeVec::new(
            Opts::new("active_orders", "Current in-flight orders per account"),
            &["account_id"],
        )
        .expect("valid active_orders metric");

        registry
            .register(Box::new(poll_cycles_total.clone()))
            .expect("register poll_cycles_total");
        registry
            .register(Box::new(poll_latency_seconds.clone()))
            .expect("register poll_latency_seconds");
        registry
            .register(Box::new(events_total.clone()))
            .expect("register events_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(active_orders.clone()))
            .expect("register active_orders");

        Self {
            registry,
            poll_cycles_total,
            poll_latency_seconds,
            events_total,
            notifications_total,
            active_orders,
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
