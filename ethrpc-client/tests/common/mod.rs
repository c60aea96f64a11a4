//! Mock nodes for ethrpc-client integration tests
//!
//! `MockWsServer` speaks just enough WebSocket JSON-RPC to drive the
//! transport: a handler maps each inbound frame to zero or more replies, and
//! the test can push frames, close cleanly, or drop connections at will.
//! `MockHttpServer` answers every POST with a canned status and body.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;
use warp::Filter;

type Handler = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    Close,
    Drop,
}

/// Mock WebSocket node
pub struct MockWsServer {
    addr: SocketAddr,
    commands: broadcast::Sender<Command>,
    received: mpsc::UnboundedReceiver<String>,
    protocols: Arc<Mutex<Vec<Option<String>>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockWsServer {
    /// Server that never answers
    pub async fn silent() -> Self {
        Self::with_handler(|_| Vec::new()).await
    }

    /// Server that answers every request with `result`
    pub async fn answering(result: Value) -> Self {
        Self::with_handler(move |text| {
            let (id, _, _) = parse_request(text);
            vec![mock_response(id, result.clone())]
        })
        .await
    }

    /// Server whose replies to each inbound frame come from `handler`
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handler: Handler = Arc::new(handler);
        let (commands, _) = broadcast::channel(64);
        let (received_tx, received) = mpsc::unbounded_channel();
        let protocols = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accept_commands = commands.clone();
        let accept_protocols = protocols.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        tokio::spawn(serve_connection(
                            stream,
                            handler.clone(),
                            accept_commands.subscribe(),
                            received_tx.clone(),
                            accept_protocols.clone(),
                        ));
                    }
                }
            }
        });

        Self {
            addr,
            commands,
            received,
            protocols,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// URL for the transport
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push a frame to every open connection
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Send(frame.into()));
    }

    /// Close every open connection with a close frame
    pub fn close_connections(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Drop every open connection without a close frame
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    /// Next frame received from a client, waiting up to five seconds
    pub async fn next_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// `Sec-WebSocket-Protocol` sent by each client so far
    pub fn protocols(&self) -> Vec<Option<String>> {
        self.protocols.lock().unwrap().clone()
    }

    /// Stop accepting and drop open connections
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.drop_connections();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    handler: Handler,
    mut commands: broadcast::Receiver<Command>,
    received: mpsc::UnboundedSender<String>,
    protocols: Arc<Mutex<Vec<Option<String>>>>,
) {
    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let proto = request.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
        protocols
            .lock()
            .unwrap()
            .push(proto.as_ref().and_then(|v| v.to_str().ok()).map(str::to_string));
        if let Some(proto) = proto {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, proto);
        }
        Ok(response)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(text.clone());
                    for reply in handler(&text) {
                        if write.send(Message::Text(reply)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Ok(Command::Send(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Ok(Command::Close) => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                Ok(Command::Drop) | Err(_) => return,
            },
        }
    }
}

/// One POST seen by [`MockHttpServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub content_type: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Mock HTTP node
pub struct MockHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockHttpServer {
    /// Answer every request with `result`, echoing the request id
    pub async fn answering(result: Value) -> Self {
        Self::with_responder(move |request| {
            (200, mock_response(request["id"].as_u64().unwrap_or(0), result.clone()))
        })
        .await
    }

    /// Answer every request with `status` and a fixed `body`
    pub async fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::with_responder(move |_| (status, body.clone())).await
    }

    /// Answer each request with the status and body `responder` picks
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> (u16, String) + Send + Sync + 'static,
    {
        let responder = Arc::new(responder);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let route = warp::post()
            .and(warp::header::optional::<String>("content-type"))
            .and(warp::body::bytes())
            .map(move |content_type: Option<String>, body: warp::hyper::body::Bytes| {
                let body = String::from_utf8_lossy(&body).to_string();
                let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
                recorded.lock().unwrap().push(RecordedRequest { content_type, body });

                let (status, reply) = responder(&parsed);
                warp::reply::with_status(
                    warp::reply::with_header(reply, "content-type", "application/json"),
                    warp::http::StatusCode::from_u16(status).unwrap(),
                )
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server) =
            warp::serve(route).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                let _ = shutdown_rx.await;
            });
        tokio::spawn(server);

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// URL for the transport
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Id, method and params of a request frame
pub fn parse_request(text: &str) -> (u64, String, Value) {
    let request: Value = serde_json::from_str(text).unwrap();
    (
        request["id"].as_u64().unwrap(),
        request["method"].as_str().unwrap().to_string(),
        request["params"].clone(),
    )
}

/// Successful reply
pub fn mock_response(id: u64, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

/// Error reply
pub fn mock_error_response(id: u64, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

/// `<api>_subscription` notification for `subscription`
pub fn subscription_notification(api: &str, subscription: Value, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": format!("{}_subscription", api),
        "params": {"subscription": subscription, "result": result}
    })
    .to_string()
}

/// Poll `condition` every 10ms for up to five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
