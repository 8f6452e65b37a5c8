//! One live websocket and the tasks that drive it.
//!
//! A [`Link`] is created per successful dial. Its reader and writer loops
//! run in a [`TaskGroup`]; the session attaches the heartbeat to the same
//! group so that closing the link stops all three. Inbound frames and the
//! first failure are reported through [`LinkEvents`], tagged with the
//! link's generation so the session can ignore reports from links it has
//! already replaced.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::OrangeError;
use crate::task::TaskGroup;

/// How long the writer may spend on the close frame during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ── Outbound ─────────────────────────────────────────────────────

/// Work for the writer loop.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    /// Protocol ping; the writer reports whether the frame went out.
    Ping(oneshot::Sender<Result<(), OrangeError>>),
}

// ── LinkFailure ──────────────────────────────────────────────────

/// Why a link stopped being usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFailure {
    /// The server sent a close frame or ended the stream.
    Closed(Option<String>),
    /// Reading a frame failed.
    Read(String),
    /// Writing a frame failed.
    Write(String),
    /// A heartbeat ping could not be delivered.
    Heartbeat(String),
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(Some(reason)) => write!(f, "closed by server: {reason}"),
            Self::Closed(None) => write!(f, "closed by server"),
            Self::Read(e) => write!(f, "read failed: {e}"),
            Self::Write(e) => write!(f, "write failed: {e}"),
            Self::Heartbeat(e) => write!(f, "heartbeat failed: {e}"),
        }
    }
}

// ── LinkEvents ───────────────────────────────────────────────────

/// Receiver of everything a link observes. Called from the link's tasks;
/// implementations must not block.
pub trait LinkEvents: Send + Sync + 'static {
    fn on_text(&self, text: &str);
    fn on_binary(&self, data: Bytes);
    fn on_failure(&self, generation: u64, failure: LinkFailure);
}

// ── Link ─────────────────────────────────────────────────────────

pub struct Link {
    generation: u64,
    sender: mpsc::Sender<Outbound>,
    tasks: TaskGroup,
}

impl Link {
    /// Dial `url` and start the reader and writer loops.
    pub async fn open(
        url: &Url,
        generation: u64,
        queue_depth: usize,
        events: Arc<dyn LinkEvents>,
    ) -> Result<Self, OrangeError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = stream.split();
        let (sender, mut outbound) = mpsc::channel::<Outbound>(queue_depth.max(1));
        let mut tasks = TaskGroup::new();

        // Writer: session -> network
        let writer_events = Arc::clone(&events);
        tasks.spawn("link-writer", move |token| async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = outbound.recv() => next,
                };
                let Some(item) = next else { break };

                let (message, ack) = match item {
                    Outbound::Text(text) => (Message::Text(text.into()), None),
                    Outbound::Binary(data) => (Message::Binary(data), None),
                    Outbound::Ping(ack) => (Message::Ping(Bytes::new()), Some(ack)),
                };
                match sink.send(message).await {
                    Ok(()) => {
                        if let Some(ack) = ack {
                            let _ = ack.send(Ok(()));
                        }
                    }
                    Err(e) => {
                        let failure = LinkFailure::Write(e.to_string());
                        if let Some(ack) = ack {
                            let _ = ack.send(Err(e.into()));
                        }
                        writer_events.on_failure(generation, failure);
                        return;
                    }
                }
            }

            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client closing".into(),
            }));
            match tokio::time::timeout(CLOSE_GRACE, sink.send(close)).await {
                Ok(Ok(())) => trace!(generation, "close frame sent"),
                Ok(Err(e)) => debug!(generation, "close frame not sent: {e}"),
                Err(_) => debug!(generation, "close frame timed out"),
            }
        });

        // Reader: network -> session
        tasks.spawn("link-reader", move |token| async move {
            let failure = loop {
                let next = tokio::select! {
                    _ = token.cancelled() => return,
                    next = source.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => events.on_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => events.on_binary(data),
                    Some(Ok(Message::Close(frame))) => {
                        break LinkFailure::Closed(frame.map(|f| f.reason.as_str().to_owned()));
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break LinkFailure::Read(e.to_string()),
                    None => break LinkFailure::Closed(None),
                }
            };
            if !token.is_cancelled() {
                events.on_failure(generation, failure);
            }
        });

        debug!(generation, %url, "link open");
        Ok(Self {
            generation,
            sender,
            tasks,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A handle for queueing frames on this link's writer.
    pub fn sender(&self) -> mpsc::Sender<Outbound> {
        self.sender.clone()
    }

    /// Token cancelled when the link is torn down.
    pub fn token(&self) -> CancellationToken {
        self.tasks.token().clone()
    }

    /// Run another loop bound to this link's lifetime.
    pub fn attach<F, Fut>(&mut self, name: &'static str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(name, f);
    }

    /// Stop every loop, send a normal close frame if the socket still
    /// accepts one, and wait for the tasks to finish.
    pub async fn shutdown(self) {
        debug!(generation = self.generation, "link shutting down");
        self.tasks.shutdown().await;
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("generation", &self.generation)
            .field("tasks", &self.tasks.running())
            .finish()
    }
}

/// Queue `item` without waiting. Returns `false` when the queue is full
/// or the writer is gone.
pub fn try_enqueue(sender: &mpsc::Sender<Outbound>, item: Outbound) -> bool {
    match sender.try_send(item) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("outbound queue full, dropping frame");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("link writer gone, dropping frame");
            false
        }
    }
}
