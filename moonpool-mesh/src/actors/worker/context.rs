//! What the `receive` hook gets to work with.

use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;

use crate::actors::storage::ActorStorage;
use crate::actors::types::{ClientId, Message, RouterId, WorkerId};
use crate::error::MeshError;
use crate::protocol::{Request, Response, RoutingHeaders, abort, handshake};
use crate::websocket::{self, WebSocketPair};

use super::WorkerInner;
use super::socket::{Socket, run_session};

/// Request-scoped handle on the worker serving a client request.
///
/// Messaging through the context has no sender: every local socket is
/// reached.
pub struct WorkerContext {
    worker: Rc<WorkerInner>,
    router_id: RouterId,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker", &self.worker.id)
            .field("router_id", &self.router_id)
            .finish()
    }
}

impl WorkerContext {
    pub(super) fn new(worker: Rc<WorkerInner>, router_id: RouterId) -> Self {
        Self { worker, router_id }
    }

    /// The serving worker.
    pub fn id(&self) -> &WorkerId {
        &self.worker.id
    }

    /// Router the request came through.
    pub fn router_id(&self) -> &RouterId {
        &self.router_id
    }

    /// The worker's durable storage.
    pub fn storage(&self) -> Rc<dyn ActorStorage> {
        self.worker.storage.clone()
    }

    /// Known neighbors, in introduction order.
    pub fn neighbors(&self) -> Vec<WorkerId> {
        self.worker.neighbors.borrow().clone()
    }

    /// Upgrade the request to a socket session.
    ///
    /// Answers `101 Switching Protocols` with the client end attached (see
    /// [`websocket::take_client_socket`]), or a plain-text error. The
    /// `on_open` hook runs before the socket joins the pool; if it fails
    /// the upgrade is refused.
    pub async fn connect(&self, request: Request) -> Response {
        if let Err(err) = handshake::validate(&request) {
            return abort(err.status(), Some(&err.to_string()));
        }

        let routing = match RoutingHeaders::validate(request.headers(), Some(&self.worker.id)) {
            Ok(routing) => routing,
            Err(err) => return abort(StatusCode::BAD_REQUEST, Some(&err.to_string())),
        };

        let (client, server, events) = WebSocketPair::new();
        let session = self.worker.next_session();
        let socket = Socket::new(
            self.worker.clone(),
            routing.client_id.clone(),
            routing.router_id,
            session,
            server,
        );

        if let Err(err) = self.worker.hooks.on_open(&socket).await {
            tracing::warn!(
                worker = %self.worker.id,
                client = %routing.client_id,
                error = %err,
                "open hook refused socket"
            );
            socket.close(websocket::NORMAL_CLOSURE, "");
            return abort(StatusCode::BAD_REQUEST, Some(err.message()));
        }

        self.worker
            .pool
            .borrow_mut()
            .insert(routing.client_id.clone(), session, socket.server());
        tracing::debug!(
            worker = %self.worker.id,
            client = %routing.client_id,
            session = %session,
            "socket opened"
        );
        tokio::task::spawn_local(run_session(socket, events));

        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        websocket::attach(&mut response, client);
        response
    }

    /// Send to every socket on this worker.
    pub fn emit(&self, message: impl Into<Message>) -> usize {
        self.worker.emit(None, &message.into().into_text(), true)
    }

    /// Send to every socket of every worker in the cluster.
    pub async fn broadcast(&self, message: impl Into<Message>) {
        self.worker
            .broadcast(&self.router_id, None, message.into().into_text(), true)
            .await;
    }

    /// Send to every socket of `target`, wherever it is connected.
    pub async fn whisper(&self, target: &ClientId, message: impl Into<Message>) {
        self.worker
            .whisper(&self.router_id, None, target, message.into().into_text())
            .await;
    }

    /// Ask every neighbor's `on_gossip` hook and collect the answers.
    ///
    /// One answer per neighbor, in neighbor order; empty without
    /// neighbors. Fails if any neighbor fails.
    pub async fn gossip(&self, message: &Value) -> Result<Vec<Value>, MeshError> {
        self.worker.gossip(&self.router_id, message).await
    }
}
