//! Change feed transports.
//!
//! [`ChangeFeed`] abstracts where mutation events come from. The
//! in-memory transport backs tests and demos; the SSE transport talks
//! to a real event stream endpoint. Both hand events to the subscriber
//! through the same [`FeedSubscription`] channel, so reconnect and
//! fallback logic is transport-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use shared::ChangeEvent;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::error::{PipelineError, PipelineResult};

const SUBSCRIPTION_BUFFER: usize = 256;

/// Source of row-level mutation events.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a live subscription. Errors here mean the transport could
    /// not connect at all; errors after connection arrive through the
    /// subscription itself.
    async fn subscribe(&self) -> PipelineResult<FeedSubscription>;
}

/// A live event stream handed to the subscriber loop.
pub struct FeedSubscription {
    rx: mpsc::Receiver<PipelineResult<ChangeEvent>>,
}

impl FeedSubscription {
    pub fn new(rx: mpsc::Receiver<PipelineResult<ChangeEvent>>) -> Self {
        Self { rx }
    }

    /// Next event. A closed channel is reported as a connectivity
    /// error so the subscriber reconnects.
    pub async fn recv(&mut self) -> PipelineResult<ChangeEvent> {
        match self.rx.recv().await {
            Some(result) => result,
            None => Err(PipelineError::Connectivity("change feed closed".into())),
        }
    }
}

/// In-process feed over a broadcast channel.
///
/// `disconnect_all` severs every open subscription, which is how tests
/// exercise the reconnect path.
pub struct MemoryFeed {
    tx: Arc<RwLock<broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::with_capacity(SUBSCRIPTION_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx: Arc::new(RwLock::new(tx)),
            capacity,
        }
    }

    /// Publish an event to all live subscriptions. Returns how many
    /// subscribers saw it.
    pub async fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.read().await.send(event).unwrap_or(0)
    }

    /// Drop every live subscription, simulating a transport outage.
    /// Later `subscribe` calls connect to the replacement channel.
    pub async fn disconnect_all(&self) {
        let (tx, _) = broadcast::channel(self.capacity);
        *self.tx.write().await = tx;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.tx.read().await.receiver_count()
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn subscribe(&self) -> PipelineResult<FeedSubscription> {
        let mut broadcast_rx = self.tx.read().await.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let _ = tx
                            .send(Err(PipelineError::Connectivity(format!(
                                "subscription lagged, {missed} events missed"
                            ))))
                            .await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(FeedSubscription::new(rx))
    }
}

/// Splits a byte stream into lines without assuming chunk boundaries
/// fall on UTF-8 character boundaries: bytes accumulate until a full
/// line is present and only complete lines are decoded.
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line with the trailing LF (and CR, if any) removed.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.bytes.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.bytes.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Server-sent-events feed over HTTP.
///
/// Streams `text/event-stream` and parses each `data:` line as one
/// [`ChangeEvent`]. Malformed rows are logged and skipped rather than
/// tearing the stream down.
pub struct SseFeed {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl SseFeed {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: None,
        }
    }

    /// Attach a bearer token for authenticated streams.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl ChangeFeed for SseFeed {
    async fn subscribe(&self) -> PipelineResult<FeedSubscription> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header("Accept", "text/event-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(PipelineError::Permission(format!(
                "feed endpoint rejected subscription: {status}"
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::Connectivity(format!(
                "feed endpoint returned {status}"
            )));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut buffer = LineBuffer::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(PipelineError::Connectivity(e.to_string()))).await;
                        return;
                    }
                };
                buffer.extend(&chunk);
                while let Some(line) = buffer.next_line() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    match ChangeEvent::from_json(data.trim().as_bytes()) {
                        Ok(event) => {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping malformed feed payload");
                        }
                    }
                }
            }
            // Stream ended; the subscriber sees a closed channel and
            // treats it as a disconnect.
        });
        Ok(FeedSubscription::new(rx))
    }
}
