//! Per-session capability handed to socket hooks.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::actors::types::{ClientId, Message, RouterId, SessionId, WorkerId};
use crate::error::MeshError;
use crate::websocket::{NORMAL_CLOSURE, ServerSocket, SocketClosed, SocketEvent, SocketEvents};

use super::WorkerInner;

/// One accepted socket, bound to its client, router and worker.
///
/// Cheap to clone. Messaging from a socket excludes the socket's own
/// client by default.
#[derive(Clone)]
pub struct Socket {
    inner: Rc<SocketInner>,
}

struct SocketInner {
    client_id: ClientId,
    router_id: RouterId,
    session: SessionId,
    server: Rc<ServerSocket>,
    worker: Rc<WorkerInner>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("client_id", &self.inner.client_id)
            .field("session", &self.inner.session)
            .field("worker", &self.inner.worker.id)
            .finish()
    }
}

impl Socket {
    pub(super) fn new(
        worker: Rc<WorkerInner>,
        client_id: ClientId,
        router_id: RouterId,
        session: SessionId,
        server: ServerSocket,
    ) -> Self {
        Self {
            inner: Rc::new(SocketInner {
                client_id,
                router_id,
                session,
                server: Rc::new(server),
                worker,
            }),
        }
    }

    /// The client this socket belongs to.
    pub fn uid(&self) -> &ClientId {
        &self.inner.client_id
    }

    /// This socket among the client's sockets on this worker.
    pub fn session(&self) -> SessionId {
        self.inner.session
    }

    /// Router that owns the session.
    pub fn router_id(&self) -> &RouterId {
        &self.inner.router_id
    }

    /// Worker hosting this socket.
    pub fn worker_id(&self) -> &WorkerId {
        &self.inner.worker.id
    }

    /// Send to this socket only.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), SocketClosed> {
        self.inner.server.send(message.into().into_text())
    }

    /// Close this socket. The session cleanup runs as for a client close.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.inner.server.close(code, reason);
    }

    /// Send to every socket on this worker.
    ///
    /// Returns how many sockets took the message.
    pub fn emit(&self, message: impl Into<Message>, include_self: bool) -> usize {
        self.inner.worker.emit(
            Some(&self.inner.client_id),
            &message.into().into_text(),
            include_self,
        )
    }

    /// Send to every socket of every worker in the cluster.
    pub async fn broadcast(&self, message: impl Into<Message>, include_self: bool) {
        self.inner
            .worker
            .broadcast(
                &self.inner.router_id,
                Some(&self.inner.client_id),
                message.into().into_text(),
                include_self,
            )
            .await;
    }

    /// Send to every socket of `target`, wherever it is connected.
    ///
    /// Does nothing when `target` is this socket's own client.
    pub async fn whisper(&self, target: &ClientId, message: impl Into<Message>) {
        self.inner
            .worker
            .whisper(
                &self.inner.router_id,
                Some(&self.inner.client_id),
                target,
                message.into().into_text(),
            )
            .await;
    }

    /// Ask every neighbor's `on_gossip` hook and collect the answers.
    ///
    /// One answer per neighbor, in neighbor order. Fails if any neighbor
    /// fails.
    pub async fn gossip(&self, message: &Value) -> Result<Vec<Value>, MeshError> {
        self.inner
            .worker
            .gossip(&self.inner.router_id, message)
            .await
    }

    pub(super) fn server(&self) -> Rc<ServerSocket> {
        self.inner.server.clone()
    }
}

/// Drive one session until it closes, then release it.
///
/// Cleanup always runs: the socket leaves the pool, the router is told,
/// and the server end is closed.
pub(super) async fn run_session(socket: Socket, mut events: SocketEvents) {
    let worker = socket.inner.worker.clone();
    let hooks = worker.hooks.clone();

    loop {
        match events.next().await {
            SocketEvent::Message(data) => {
                if let Err(err) = hooks.on_message(&socket, data).await {
                    tracing::warn!(
                        worker = %worker.id,
                        client = %socket.uid(),
                        error = %err,
                        "message hook failed"
                    );
                }
            }
            SocketEvent::Close { code, reason } => {
                tracing::debug!(
                    worker = %worker.id,
                    client = %socket.uid(),
                    code,
                    reason = %reason,
                    "socket closed"
                );
                if let Err(err) = hooks.on_close(&socket).await {
                    tracing::warn!(worker = %worker.id, error = %err, "close hook failed");
                }
                break;
            }
            SocketEvent::Error(error) => {
                tracing::debug!(
                    worker = %worker.id,
                    client = %socket.uid(),
                    error = %error,
                    "socket failed"
                );
                if let Err(err) = hooks.on_error(&socket).await {
                    tracing::warn!(worker = %worker.id, error = %err, "error hook failed");
                }
                break;
            }
        }
    }

    let is_empty = worker
        .pool
        .borrow_mut()
        .remove(&socket.inner.client_id, socket.inner.session);
    worker
        .notify_close(&socket.inner.client_id, &socket.inner.router_id, is_empty)
        .await;
    socket.inner.server.close(NORMAL_CLOSURE, "");
}
