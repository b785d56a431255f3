use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PAYMENTS_INITIATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static IPN_NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ORDERS_CONFIRMED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let initiated = IntCounterVec::new(
        Opts::new(
            "payments_initiated_total",
            "Form-token requests accepted, by currency",
        ),
        &["currency"],
    )
    .expect("Failed to create payments_initiated_total metric");

    let notifications = IntCounterVec::new(
        Opts::new(
            "ipn_notifications_total",
            "Inbound payment notifications, by reconciliation outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create ipn_notifications_total metric");

    let confirmed = IntCounterVec::new(
        Opts::new(
            "orders_confirmed_total",
            "Orders materialized from paid notifications, by currency",
        ),
        &["currency"],
    )
    .expect("Failed to create orders_confirmed_total metric");

    registry
        .register(Box::new(initiated.clone()))
        .expect("Failed to register payments_initiated_total");
    registry
        .register(Box::new(notifications.clone()))
        .expect("Failed to register ipn_notifications_total");
    registry
        .register(Box::new(confirmed.clone()))
        .expect("Failed to register orders_confirmed_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    PAYMENTS_INITIATED_TOTAL
        .set(initiated)
        .expect("Failed to set payments_initiated_total");
    IPN_NOTIFICATIONS_TOTAL
        .set(notifications)
        .expect("Failed to set ipn_notifications_total");
    ORDERS_CONFIRMED_TOTAL
        .set(confirmed)
        .expect("Failed to set orders_confirmed_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record an accepted form-token request.
pub fn record_payment_initiated(currency: &str) {
    if let Some(counter) = PAYMENTS_INITIATED_TOTAL.get() {
        counter.with_label_values(&[currency]).inc();
    }
}

/// Record a processed webhook delivery and its outcome.
pub fn record_ipn_outcome(outcome: &str) {
    if let Some(counter) = IPN_NOTIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a newly confirmed order.
pub fn record_order_confirmed(currency: &str) {
    if let Some(counter) = ORDERS_CONFIRMED_TOTAL.get() {
        counter.with_label_values(&[currency]).inc();
    }
}
