//! HTTP transport
//!
//! One POST per call, no state shared between calls apart from the id
//! counter, the debug flag and an observational connected flag.
//!
//! | Node reply                         | Outcome                               |
//! |------------------------------------|---------------------------------------|
//! | no HTTP response at all            | `TransportError::Request`, disconnected |
//! | non-2xx status                     | `TransportError::Http`, disconnected  |
//! | 2xx, body not a JSON-RPC response  | `Error::Protocol`, connected          |
//! | 2xx, body has `error`              | `Error::Rpc`, connected               |
//! | 2xx, body has `result`             | the result, connected                 |
//!
//! The connected flag never blocks a call; a disconnected transport still
//! tries every request.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ethrpc_client::{HttpTransport, Transport};
//! use ethrpc_core::params;
//! use std::time::Duration;
//!
//! # async fn example() -> ethrpc_core::Result<()> {
//! let node = HttpTransport::builder("http://127.0.0.1:8545")
//!     .timeout(Duration::from_secs(10))
//!     .debug(true)
//!     .build()?;
//!
//! let balance = node
//!     .execute("eth_getBalance", params!["0x407d73d8a49eeb85d32cf465507dd71d507100c1", "latest"])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::call_log::{CallLog, DEFAULT_CAPACITY};
use crate::metrics::TransportMetrics;
use crate::transport::Transport;
use async_trait::async_trait;
use ethrpc_core::{BaseTransport, Error, JsonRpcResponse, ObservabilityConfig, Result, TransportError};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ethrpc/", env!("CARGO_PKG_VERSION"));

/// JSON-RPC over HTTP POST
#[derive(Clone)]
pub struct HttpTransport {
    base: BaseTransport,
    client: Client,
    url: Url,
    connected: Arc<AtomicBool>,
    metrics: Option<TransportMetrics>,
    call_log: CallLog,
}

impl HttpTransport {
    /// Transport with default settings
    pub fn new(url: &str) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Start configuring a transport
    pub fn builder(url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(url)
    }

    /// Endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Recent calls made through this transport
    pub fn call_log(&self) -> &CallLog {
        &self.call_log
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    async fn post(&self, method: &str, params: &[Value]) -> Result<Value> {
        let body = self.base.encode(method, params.to_vec())?;
        self.base.log(format!("POST {} {}", self.url, body));

        let response = match self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.set_connected(false);
                self.base.error(format!("{}: request failed: {}", method, e));
                return Err(TransportError::Request(e.to_string()).into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.set_connected(false);
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            self.base
                .error(format!("{}: HTTP {} {}", method, status.as_u16(), status_text));
            return Err(TransportError::Http {
                status: status.as_u16(),
                status_text,
            }
            .into());
        }

        self.set_connected(true);

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("reading body: {}", e)))?;

        let reply: JsonRpcResponse = serde_json::from_str(&text).map_err(|e| {
            self.base
                .error(format!("{}: unexpected response body {}", method, text));
            Error::Protocol(format!("invalid response body: {}", e))
        })?;

        if reply.is_error() {
            self.base.error(format!("{}: {}", method, text));
        } else {
            self.base.log(format!("{}: {}", method, text));
        }

        reply.into_result()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn base(&self) -> &BaseTransport {
        &self.base
    }

    async fn execute(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let started = Instant::now();
        let outcome = self.post(method, &params).await;
        let elapsed = started.elapsed();

        self.call_log.record(method, &params, &outcome, elapsed);
        if let Some(metrics) = &self.metrics {
            metrics.record_request(method, &outcome, elapsed.as_secs_f64());
        }

        outcome
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("base", &self.base)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for [`HttpTransport`]
pub struct HttpTransportBuilder {
    url: String,
    timeout: Duration,
    user_agent: String,
    debug: bool,
    client: Option<Client>,
    metrics: Option<TransportMetrics>,
    call_log_capacity: usize,
}

impl HttpTransportBuilder {
    /// Builder with defaults for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            debug: false,
            client: None,
            metrics: None,
            call_log_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Per-request timeout; an expired request fails with `TransportError::Request`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `User-Agent` header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Initial debug flag
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Use a preconfigured client; timeout and user agent are then ignored
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Record metrics from the global meter named `service_name`
    pub fn with_metrics(mut self, service_name: impl Into<String>) -> Self {
        self.metrics = Some(TransportMetrics::new(service_name, "http"));
        self
    }

    /// Install observability from `config` and record metrics if it enables them
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        if config.enable_metrics {
            self.metrics = Some(TransportMetrics::new(config.service_name.clone(), "http"));
        }
        if let Err(e) = ethrpc_core::init_observability(config) {
            tracing::warn!(error = %e, "observability not installed");
        }
        self
    }

    /// Number of recent calls kept; 0 disables the call log
    pub fn call_log_capacity(mut self, capacity: usize) -> Self {
        self.call_log_capacity = capacity;
        self
    }

    /// Validate the URL and create the transport
    pub fn build(self) -> Result<HttpTransport> {
        let url = Url::parse(&self.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", self.url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme for HTTP transport: {}",
                url.scheme()
            ))
            .into());
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .user_agent(self.user_agent)
                .build()
                .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {}", e)))?,
        };

        let base = BaseTransport::new();
        base.set_debug(self.debug);

        Ok(HttpTransport {
            base,
            client,
            url,
            connected: Arc::new(AtomicBool::new(false)),
            metrics: self.metrics,
            call_log: CallLog::new(self.call_log_capacity),
        })
    }
}
