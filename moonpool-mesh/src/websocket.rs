//! In-process full-duplex socket pair.
//!
//! A successful upgrade answers `101 Switching Protocols` and hands the
//! [`ClientSocket`] end back to the caller inside the response extensions.
//! The worker keeps the [`ServerSocket`] end and drains [`SocketEvents`].
//!
//! ```text
//!   ClientSocket ──SocketEvent──► SocketEvents   (worker reader task)
//!   ClientSocket ◄────Frame────── ServerSocket   (worker sends)
//! ```

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::protocol::Response;

/// Close code used when the peer went away without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code for a normal close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// A frame delivered to the client end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text message.
    Text(String),
    /// The server closed the connection.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// An event observed by the server end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The client sent a text message.
    Message(String),
    /// The connection closed.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The connection failed.
    Error(String),
}

/// The socket end was already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("socket closed")]
pub struct SocketClosed;

/// Constructor for a connected socket pair.
pub struct WebSocketPair;

impl WebSocketPair {
    /// Create a connected pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (ClientSocket, ServerSocket, SocketEvents) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let client = ClientSocket {
            frames: frame_rx,
            events: event_tx.clone(),
            closed: false,
        };
        let server = ServerSocket {
            frames: frame_tx,
            events: event_tx,
            closed: Cell::new(false),
        };
        (client, server, SocketEvents { events: event_rx })
    }
}

/// The client's end of the pair.
///
/// Dropping it without calling [`close`](Self::close) is observed by the
/// server as an abnormal closure.
#[derive(Debug)]
pub struct ClientSocket {
    frames: UnboundedReceiver<Frame>,
    events: UnboundedSender<SocketEvent>,
    closed: bool,
}

impl ClientSocket {
    /// Send a text message to the server.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SocketClosed> {
        if self.closed {
            return Err(SocketClosed);
        }
        self.events
            .send(SocketEvent::Message(text.into()))
            .map_err(|_| SocketClosed)
    }

    /// Close the connection with a code and reason.
    pub fn close(&mut self, code: u16, reason: impl Into<String>) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        let _ = self.events.send(SocketEvent::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Fail the connection, as a transport error would.
    pub fn fail(&mut self, error: impl Into<String>) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        let _ = self.events.send(SocketEvent::Error(error.into()));
    }

    /// Wait for the next frame from the server.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.frames.try_recv().ok()
    }

    /// Take every queued text frame, skipping close frames.
    pub fn drain_text(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(frame) = self.try_recv() {
            if let Frame::Text(text) = frame {
                texts.push(text);
            }
        }
        texts
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.events.send(SocketEvent::Close {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            });
        }
    }
}

/// The server's end of the pair.
#[derive(Debug)]
pub struct ServerSocket {
    frames: UnboundedSender<Frame>,
    events: UnboundedSender<SocketEvent>,
    closed: Cell<bool>,
}

impl ServerSocket {
    /// Send a text frame to the client.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SocketClosed> {
        if self.closed.get() {
            return Err(SocketClosed);
        }
        self.frames
            .send(Frame::Text(text.into()))
            .map_err(|_| SocketClosed)
    }

    /// Close the connection. Idempotent.
    ///
    /// Sends a close frame to the client and queues a close event so the
    /// reader sees server-initiated closes the same way as client ones.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if self.closed.replace(true) {
            return;
        }
        let reason = reason.into();
        let _ = self.frames.send(Frame::Close {
            code,
            reason: reason.clone(),
        });
        let _ = self.events.send(SocketEvent::Close { code, reason });
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Stream of events for the server end.
#[derive(Debug)]
pub struct SocketEvents {
    events: UnboundedReceiver<SocketEvent>,
}

impl SocketEvents {
    /// Wait for the next event.
    ///
    /// Once every sender is gone this keeps answering with an abnormal close.
    pub async fn next(&mut self) -> SocketEvent {
        self.events.recv().await.unwrap_or(SocketEvent::Close {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        })
    }
}

/// Response extension carrying the client end of an accepted upgrade.
#[derive(Clone)]
struct Upgraded(Arc<Mutex<Option<ClientSocket>>>);

/// Attach the client end to a `101` response.
pub(crate) fn attach(response: &mut Response, client: ClientSocket) {
    response
        .extensions_mut()
        .insert(Upgraded(Arc::new(Mutex::new(Some(client)))));
}

/// Take the client end out of an upgrade response.
///
/// Returns `None` for responses that are not accepted upgrades, or when the
/// socket was already taken.
pub fn take_client_socket(response: &mut Response) -> Option<ClientSocket> {
    let upgraded = response.extensions_mut().remove::<Upgraded>()?;
    let mut slot = upgraded.0.lock().ok()?;
    slot.take()
}
