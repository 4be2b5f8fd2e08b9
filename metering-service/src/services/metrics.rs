//! Metrics module for metering-service.
//! Provides Prometheus metrics for limit enforcement, storage billing and
//! wallet operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "metering_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Slot consumption decisions (per-org metering)
pub static USAGE_SLOTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Hourly storage charge attempts
pub static STORAGE_CHARGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Wallet debit attempts
pub static WALLET_DEBITS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Charged amount counter by currency and source (monetary tracking)
pub static CHARGE_AMOUNT_TOTAL: OnceLock<prometheus::CounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    USAGE_SLOTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "metering_usage_slots_total",
                "Slot consumption decisions by org, kind and outcome"
            ),
            &["org_id", "kind", "outcome"]
        )
        .expect("Failed to register USAGE_SLOTS_TOTAL")
    });

    STORAGE_CHARGES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "metering_storage_charges_total",
                "Hourly storage charge attempts by org and outcome"
            ),
            &["org_id", "outcome"]
        )
        .expect("Failed to register STORAGE_CHARGES_TOTAL")
    });

    WALLET_DEBITS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "metering_wallet_debits_total",
                "Wallet debit attempts by source and outcome"
            ),
            &["source", "outcome"]
        )
        .expect("Failed to register WALLET_DEBITS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("metering_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    CHARGE_AMOUNT_TOTAL.get_or_init(|| {
        prometheus::register_counter_vec!(
            prometheus::opts!(
                "metering_charge_amount_total",
                "Total charged amount by currency and source"
            ),
            &["currency", "source"]
        )
        .expect("Failed to register CHARGE_AMOUNT_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a slot consumption decision.
pub fn record_usage_slot(org_id: &str, kind: &str, outcome: &str) {
    if let Some(counter) = USAGE_SLOTS_TOTAL.get() {
        counter.with_label_values(&[org_id, kind, outcome]).inc();
    }
}

/// Record a storage charge attempt.
pub fn record_storage_charge(org_id: &str, outcome: &str) {
    if let Some(counter) = STORAGE_CHARGES_TOTAL.get() {
        counter.with_label_values(&[org_id, outcome]).inc();
    }
}

/// Record a wallet debit attempt.
pub fn record_wallet_debit(source: &str, outcome: &str) {
    if let Some(counter) = WALLET_DEBITS_TOTAL.get() {
        counter.with_label_values(&[source, outcome]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}

/// Record a charged amount for financial tracking.
pub fn record_charge_amount(currency: &str, source: &str, amount: f64) {
    if let Some(counter) = CHARGE_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[currency, source])
            .inc_by(amount.abs());
    }
}
