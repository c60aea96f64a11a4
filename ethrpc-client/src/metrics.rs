//! Transport metrics
//!
//! OpenTelemetry instruments recorded by both transports when metrics are
//! enabled on their builders. Without a global meter provider (see
//! `ethrpc_core::init_observability`) they are no-ops.
//!
//! - **ethrpc.requests.total**: calls by method and status (counter)
//! - **ethrpc.request.duration**: call latency in seconds (histogram)
//! - **ethrpc.errors.total**: failures by kind (counter)
//! - **ethrpc.connection.state**: 0=connecting, 1=open, 2=closed (gauge)
//! - **ethrpc.pending.calls**: calls and subscriptions awaiting a reply (gauge)
//! - **ethrpc.subscription.messages**: pub/sub deliveries by api (counter)

use crate::connection_state::ConnectionState;
use ethrpc_core::Error;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Metrics for one transport
#[derive(Clone)]
pub struct TransportMetrics {
    transport: &'static str,
    requests_total: Counter<u64>,
    request_duration: Histogram<f64>,
    errors_total: Counter<u64>,
    connection_state: Gauge<i64>,
    pending_calls: Gauge<u64>,
    subscription_messages: Counter<u64>,
}

impl TransportMetrics {
    /// Instruments from the global meter named `service_name`
    pub fn new(service_name: impl Into<String>, transport: &'static str) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter, transport)
    }

    /// Instruments from a caller-supplied meter
    pub fn new_with_meter(meter: &Meter, transport: &'static str) -> Self {
        Self {
            transport,
            requests_total: meter
                .u64_counter("ethrpc.requests.total")
                .with_description("Total number of JSON-RPC calls")
                .build(),
            request_duration: meter
                .f64_histogram("ethrpc.request.duration")
                .with_description("JSON-RPC call duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("ethrpc.errors.total")
                .with_description("Total number of failed calls by error kind")
                .build(),
            connection_state: meter
                .i64_gauge("ethrpc.connection.state")
                .with_description("Connection state (0=connecting, 1=open, 2=closed)")
                .build(),
            pending_calls: meter
                .u64_gauge("ethrpc.pending.calls")
                .with_description("Calls and subscriptions awaiting a reply")
                .build(),
            subscription_messages: meter
                .u64_counter("ethrpc.subscription.messages")
                .with_description("Total number of subscription deliveries")
                .build(),
        }
    }

    /// Record one finished call
    pub fn record_request(&self, method: &str, outcome: &Result<serde_json::Value, Error>, duration_secs: f64) {
        let status = if outcome.is_ok() { "success" } else { "error" };
        let attributes = &[
            KeyValue::new("transport", self.transport),
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);

        if let Err(e) = outcome {
            self.record_error(e);
        }
    }

    /// Record a failure by kind
    pub fn record_error(&self, error: &Error) {
        let attributes = &[
            KeyValue::new("transport", self.transport),
            KeyValue::new("error_type", error_kind(error)),
        ];
        self.errors_total.add(1, attributes);
    }

    /// Record a state transition
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state
            .record(state.as_gauge(), &[KeyValue::new("transport", self.transport)]);
    }

    /// Record the size of the pending-call map
    pub fn update_pending(&self, count: usize) {
        self.pending_calls
            .record(count as u64, &[KeyValue::new("transport", self.transport)]);
    }

    /// Record one subscription delivery
    pub fn record_subscription_message(&self, api: &str) {
        let attributes = &[
            KeyValue::new("transport", self.transport),
            KeyValue::new("api", api.to_string()),
        ];
        self.subscription_messages.add(1, attributes);
    }
}

impl std::fmt::Debug for TransportMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportMetrics")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Short label for an error, used as a metric attribute
pub fn error_kind(error: &Error) -> &'static str {
    use ethrpc_core::TransportError;

    match error {
        Error::Transport(TransportError::Http { .. }) => "http_status",
        Error::Transport(TransportError::Request(_)) => "request",
        Error::Transport(TransportError::WebSocket(_)) => "websocket",
        Error::Transport(TransportError::ConnectionClosed) => "connection_closed",
        Error::Transport(TransportError::InvalidUrl(_)) => "invalid_url",
        Error::Transport(TransportError::Auth(_)) => "auth",
        Error::Rpc(_) => "rpc",
        Error::Protocol(_) => "protocol",
        Error::Serialization(_) => "serialization",
        Error::UnknownSubscription(_) => "unknown_subscription",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethrpc_core::{JsonRpcErrorData, TransportError};
    use serde_json::json;

    #[test]
    fn test_metrics_recording() {
        let metrics = TransportMetrics::new("test-transport", "ws");

        metrics.update_connection_state(ConnectionState::Connecting);
        metrics.update_connection_state(ConnectionState::Open);
        metrics.record_request("eth_blockNumber", &Ok(json!("0x10")), 0.05);
        metrics.record_request(
            "eth_call",
            &Err(Error::Rpc(JsonRpcErrorData::new(3, "execution reverted"))),
            0.01,
        );
        metrics.update_pending(4);
        metrics.record_subscription_message("eth");
        metrics.update_connection_state(ConnectionState::Closed);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(error_kind(&TransportError::ConnectionClosed.into()), "connection_closed");
        assert_eq!(
            error_kind(&TransportError::Http { status: 502, status_text: "Bad Gateway".into() }.into()),
            "http_status"
        );
        assert_eq!(error_kind(&Error::Rpc(JsonRpcErrorData::new(1, "x"))), "rpc");
        assert_eq!(error_kind(&Error::Protocol("bad".into())), "protocol");
        assert_eq!(error_kind(&Error::UnknownSubscription("0x1".into())), "unknown_subscription");
    }
}
