//! Prometheus metrics for the credential authority.
//!
//! Provides counters and histograms for observability.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

/// Credential operations counter.
pub static CREDENTIAL_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_authority_credential_operations_total",
        "Total number of credential store operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register credential_operations metric")
});

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_authority_tokens_issued_total",
        "Total number of tokens issued",
        &["operation"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Token verifications counter.
pub static TOKEN_VERIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_authority_token_verifications_total",
        "Total number of token verifications",
        &["outcome"]
    )
    .expect("Failed to register token_verifications metric")
});

/// Key provisioning counter.
pub static KEY_EVENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "credential_authority_key_events_total",
        "Total number of signing key load and provisioning events",
        &["event"]
    )
    .expect("Failed to register key_events metric")
});

/// gRPC method latency histogram.
pub static GRPC_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "credential_authority_grpc_latency_seconds",
        "gRPC method latency in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register grpc_latency metric")
});

/// Record a credential operation; `outcome` is `ok` or an error code.
pub fn record_credential_operation(operation: &str, outcome: &str) {
    CREDENTIAL_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a token issuance.
pub fn record_token_issued(operation: &str) {
    TOKENS_ISSUED.with_label_values(&[operation]).inc();
}

/// Record a token verification.
pub fn record_token_verification(outcome: &str) {
    TOKEN_VERIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Record a key event (`loaded`, `provisioned`, `read_failed`, `repaired`).
pub fn record_key_event(event: &str) {
    KEY_EVENTS.with_label_values(&[event]).inc();
}

/// Record gRPC method latency.
pub fn record_grpc_latency(method: &str, duration_secs: f64) {
    GRPC_LATENCY.with_label_values(&[method]).observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_credential_operation() {
        record_credential_operation("create", "ok");
        let value = CREDENTIAL_OPERATIONS
            .with_label_values(&["create", "ok"])
            .get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_token_issued() {
        record_token_issued("login");
        assert!(TOKENS_ISSUED.with_label_values(&["login"]).get() > 0.0);
    }

    #[test]
    fn test_record_token_verification() {
        record_token_verification("TOKEN_EXPIRED");
        let value = TOKEN_VERIFICATIONS
            .with_label_values(&["TOKEN_EXPIRED"])
            .get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_grpc_latency() {
        record_grpc_latency("GrantAuth", 0.05);
        let count = GRPC_LATENCY
            .with_label_values(&["GrantAuth"])
            .get_sample_count();
        assert!(count > 0);
    }
}
