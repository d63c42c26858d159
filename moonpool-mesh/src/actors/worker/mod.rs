//! WorkerActor: owns client sessions and takes part in the neighbor mesh.
//!
//! # Design
//!
//! - Sessions live in an in-memory [`SessionPool`] keyed by client; one
//!   client may hold several sockets on the same worker.
//! - Neighbors are learned only from introductions sent by the router when
//!   a worker is created. They are not persisted, and a re-activated worker
//!   starts with none.
//! - Control traffic from the router and from neighbors arrives through
//!   the same [`fetch`](ActorHandler::fetch) as client traffic and is told
//!   apart by path.
//! - Every session, socket or one-shot request, ends with a close-notify to
//!   the owning router so it can release the capacity.
//!
//! # Messaging
//!
//! | operation   | local pool            | neighbors                     |
//! |-------------|-----------------------|-------------------------------|
//! | `emit`      | every socket          | none                          |
//! | `broadcast` | every socket          | broadcast relay to all        |
//! | `whisper`   | target's sockets      | whisper relay if not local    |
//! | `gossip`    | none                  | gossip relay, answers collected |
//!
//! Relay failures are logged and dropped. Gossip is the exception: the
//! caller asked for the answers, so a failed neighbor fails the call.

mod context;
mod pool;
mod socket;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use futures::future::join_all;
use http::{Method, StatusCode, Uri};
use serde_json::Value;

use crate::error::{MeshError, ProtocolError};
use crate::protocol::{
    ControlRoute, Request, Response, RoutingHeaders, abort, empty, headers, json, read_header,
    set_header,
};

use super::hooks::WorkerHooks;
use super::namespace::{ActorHandler, ActorNamespace, ActorState};
use super::routing::RoutingActor;
use super::storage::ActorStorage;
use super::types::{ClientId, RouterId, SessionId, WorkerId};

pub use context::WorkerContext;
pub use socket::Socket;

use pool::SessionPool;

/// The namespaces a worker talks to.
#[derive(Debug, Clone)]
pub struct WorkerLink {
    /// Routers that own this worker's sessions.
    pub parent: ActorNamespace<RoutingActor>,
    /// Sibling workers, for neighbor relays.
    pub siblings: ActorNamespace<WorkerActor>,
}

struct WorkerInner {
    id: WorkerId,
    storage: Rc<dyn ActorStorage>,
    hooks: Rc<dyn WorkerHooks>,
    link: WorkerLink,
    router_id: RefCell<Option<RouterId>>,
    neighbors: RefCell<Vec<WorkerId>>,
    pool: RefCell<SessionPool>,
    next_session: Cell<u64>,
}

/// Session-owning actor.
pub struct WorkerActor {
    inner: Rc<WorkerInner>,
}

impl fmt::Debug for WorkerActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerActor")
            .field("id", &self.inner.id)
            .field("router_id", &self.inner.router_id.borrow())
            .field("neighbors", &self.inner.neighbors.borrow())
            .finish()
    }
}

impl WorkerActor {
    /// Create a worker instance.
    pub fn new(state: ActorState<WorkerId>, hooks: Rc<dyn WorkerHooks>, link: WorkerLink) -> Self {
        Self {
            inner: Rc::new(WorkerInner {
                id: state.id,
                storage: state.storage,
                hooks,
                link,
                router_id: RefCell::new(None),
                neighbors: RefCell::new(Vec::new()),
                pool: RefCell::new(SessionPool::default()),
                next_session: Cell::new(0),
            }),
        }
    }

    /// This worker's identity.
    pub fn id(&self) -> &WorkerId {
        &self.inner.id
    }

    /// Known neighbors, in introduction order.
    pub fn neighbors(&self) -> Vec<WorkerId> {
        self.inner.neighbors.borrow().clone()
    }

    /// Number of live sockets `client` holds here.
    pub fn session_count(&self, client: &ClientId) -> usize {
        self.inner.pool.borrow().count(client)
    }

    /// The router named by the first request this worker accepted.
    pub fn router_id(&self) -> Option<RouterId> {
        self.inner.router_id.borrow().clone()
    }

    /// Hand a client request to the `receive` hook.
    ///
    /// Unless the hook upgraded the request, the router is told the
    /// session is over, whatever the outcome.
    async fn receive(&self, routing: RoutingHeaders, request: Request) -> Response {
        let ctx = WorkerContext::new(self.inner.clone(), routing.router_id.clone());
        let response = match self.inner.hooks.receive(&ctx, request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    worker = %self.inner.id,
                    client = %routing.client_id,
                    error = %err,
                    "receive hook failed"
                );
                abort(StatusCode::BAD_REQUEST, Some(err.message()))
            }
        };

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            let is_empty = self.inner.pool.borrow().count(&routing.client_id) == 0;
            self.inner
                .notify_close(&routing.client_id, &routing.router_id, is_empty)
                .await;
        }
        response
    }
}

#[async_trait::async_trait(?Send)]
impl ActorHandler for WorkerActor {
    type Id = WorkerId;

    async fn fetch(&self, request: Request) -> Response {
        let routing = match RoutingHeaders::validate(request.headers(), Some(&self.inner.id)) {
            Ok(routing) => routing,
            Err(err) => {
                tracing::debug!(worker = %self.inner.id, error = %err, "request rejected");
                return MeshError::from(err).into_response();
            }
        };
        self.inner.learn_router(&routing.router_id);

        let route = match ControlRoute::from_path(request.uri().path()) {
            Some(route) => route,
            None => return self.receive(routing, request).await,
        };

        self.inner
            .control(route, &routing, request)
            .await
            .unwrap_or_else(|err| {
                tracing::debug!(
                    worker = %self.inner.id,
                    route = route.name(),
                    error = %err,
                    "control request failed"
                );
                err.into_response()
            })
    }
}

impl WorkerInner {
    fn learn_router(&self, router: &RouterId) {
        let mut known = self.router_id.borrow_mut();
        if known.is_none() {
            *known = Some(router.clone());
        }
    }

    fn next_session(&self) -> SessionId {
        let id = self.next_session.get() + 1;
        self.next_session.set(id);
        SessionId(id)
    }

    fn add_neighbor(&self, neighbor: WorkerId) {
        if neighbor == self.id {
            return;
        }
        let mut neighbors = self.neighbors.borrow_mut();
        if !neighbors.contains(&neighbor) {
            tracing::debug!(worker = %self.id, neighbor = %neighbor, "neighbor added");
            neighbors.push(neighbor);
        }
    }

    async fn control(
        &self,
        route: ControlRoute,
        routing: &RoutingHeaders,
        request: Request,
    ) -> Result<Response, MeshError> {
        match route {
            ControlRoute::Neighbor => {
                let neighbor =
                    read_header(request.headers(), &headers::NEIGHBOR_ID, "Neighbor ID")?
                        .ok_or(ProtocolError::MissingNeighborId)?;
                self.add_neighbor(WorkerId::from(neighbor));
                Ok(empty())
            }
            ControlRoute::Broadcast => {
                self.emit(Some(&routing.client_id), &body_text(&request), false);
                Ok(empty())
            }
            ControlRoute::Whisper => {
                let target = routing
                    .target_id
                    .as_ref()
                    .ok_or(ProtocolError::MissingTargetId)?;
                self.deliver(target, &body_text(&request));
                Ok(empty())
            }
            ControlRoute::Gossip => {
                let message = body_json(request.body())?;
                let payload = self.hooks.on_gossip(message).await?;
                Ok(json(&payload)?)
            }
            ControlRoute::Close | ControlRoute::Identify => {
                Err(ProtocolError::UnsupportedRoute(route.name()).into())
            }
        }
    }

    /// Send to every local socket, skipping the sender's unless
    /// `include_self`. Returns how many sockets took the message.
    fn emit(&self, sender: Option<&ClientId>, text: &str, include_self: bool) -> usize {
        let excluded = if include_self { None } else { sender };
        let sockets = self.pool.borrow().sockets_except(excluded);
        sockets
            .iter()
            .filter(|socket| socket.send(text).is_ok())
            .count()
    }

    /// Send to the target's local sockets. Returns whether it has any here.
    fn deliver(&self, target: &ClientId, text: &str) -> bool {
        let sockets = self.pool.borrow().sockets_of(target);
        for socket in &sockets {
            let _ = socket.send(text);
        }
        !sockets.is_empty()
    }

    async fn broadcast(
        &self,
        router: &RouterId,
        sender: Option<&ClientId>,
        text: String,
        include_self: bool,
    ) {
        self.emit(sender, &text, include_self);
        let results = self
            .dispatch(ControlRoute::Broadcast, router, sender, None, Bytes::from(text))
            .await;
        self.log_relay_failures(ControlRoute::Broadcast, results);
    }

    async fn whisper(
        &self,
        router: &RouterId,
        sender: Option<&ClientId>,
        target: &ClientId,
        text: String,
    ) {
        if sender == Some(target) {
            return;
        }
        if self.deliver(target, &text) {
            return;
        }
        let results = self
            .dispatch(
                ControlRoute::Whisper,
                router,
                sender,
                Some(target),
                Bytes::from(text),
            )
            .await;
        self.log_relay_failures(ControlRoute::Whisper, results);
    }

    async fn gossip(&self, router: &RouterId, message: &Value) -> Result<Vec<Value>, MeshError> {
        if self.neighbors.borrow().is_empty() {
            return Ok(Vec::new());
        }

        let body = Bytes::from(serde_json::to_vec(message)?);
        let results = self
            .dispatch(ControlRoute::Gossip, router, None, None, body)
            .await;

        let mut payloads = Vec::with_capacity(results.len());
        for (_, result) in results {
            let response = result?;
            if !response.status().is_success() {
                return Err(MeshError::Remote {
                    status: response.status(),
                    message: body_text_of(response.body()),
                });
            }
            payloads.push(body_json(response.body())?);
        }
        Ok(payloads)
    }

    /// Send one relay to every neighbor known right now and wait for all.
    ///
    /// Results come back in neighbor order.
    async fn dispatch(
        &self,
        route: ControlRoute,
        router: &RouterId,
        sender: Option<&ClientId>,
        target: Option<&ClientId>,
        body: Bytes,
    ) -> Vec<(WorkerId, Result<Response, MeshError>)> {
        let neighbors = self.neighbors.borrow().clone();
        let calls = neighbors.into_iter().map(|neighbor| {
            let request = self.relay_request(route, router, sender, target, &neighbor, body.clone());
            let stub = self.link.siblings.get(&neighbor);
            async move {
                let result = match request {
                    Ok(request) => stub.fetch(request).await,
                    Err(err) => Err(err),
                };
                (neighbor, result)
            }
        });
        join_all(calls).await
    }

    fn relay_request(
        &self,
        route: ControlRoute,
        router: &RouterId,
        sender: Option<&ClientId>,
        target: Option<&ClientId>,
        neighbor: &WorkerId,
        body: Bytes,
    ) -> Result<Request, MeshError> {
        let mut request = Request::new(body);
        *request.method_mut() = Method::POST;
        *request.uri_mut() = Uri::from_static(route.path());

        let map = request.headers_mut();
        set_header(map, headers::WORKER_ID, neighbor.as_str())?;
        set_header(map, headers::NEIGHBOR_ID, self.id.as_str())?;
        set_header(map, headers::ROUTER_ID, router.as_str())?;
        if let Some(sender) = sender {
            set_header(map, headers::CLIENT_ID, sender.as_str())?;
        }
        if let Some(target) = target {
            set_header(map, headers::TARGET_ID, target.as_str())?;
        }
        Ok(request)
    }

    fn log_relay_failures(
        &self,
        route: ControlRoute,
        results: Vec<(WorkerId, Result<Response, MeshError>)>,
    ) {
        for (neighbor, result) in results {
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => tracing::debug!(
                    worker = %self.id,
                    neighbor = %neighbor,
                    route = route.name(),
                    status = %response.status(),
                    "relay rejected"
                ),
                Err(err) => tracing::debug!(
                    worker = %self.id,
                    neighbor = %neighbor,
                    route = route.name(),
                    error = %err,
                    "relay failed"
                ),
            }
        }
    }

    /// Tell the router one session of `client` ended here.
    async fn notify_close(&self, client: &ClientId, router: &RouterId, is_empty: bool) {
        let result = match self.close_request(client, router, is_empty) {
            Ok(request) => self.link.parent.get(router).fetch(request).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(response) if response.status().is_success() => tracing::debug!(
                worker = %self.id,
                client = %client,
                is_empty,
                "session closed"
            ),
            Ok(response) => tracing::warn!(
                worker = %self.id,
                client = %client,
                status = %response.status(),
                reason = %body_text_of(response.body()),
                "close-notify rejected"
            ),
            Err(err) => tracing::warn!(
                worker = %self.id,
                client = %client,
                error = %err,
                "close-notify failed"
            ),
        }
    }

    fn close_request(
        &self,
        client: &ClientId,
        router: &RouterId,
        is_empty: bool,
    ) -> Result<Request, MeshError> {
        let mut request = Request::new(Bytes::new());
        *request.uri_mut() = Uri::from_static(ControlRoute::Close.path());

        let map = request.headers_mut();
        set_header(map, headers::ROUTER_ID, router.as_str())?;
        set_header(map, headers::WORKER_ID, self.id.as_str())?;
        set_header(map, headers::CLIENT_ID, client.as_str())?;
        set_header(map, headers::IS_EMPTY, headers::flag(is_empty))?;
        Ok(request)
    }
}

fn body_text(request: &Request) -> String {
    body_text_of(request.body())
}

fn body_text_of(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Decode a JSON body. An empty body is `null`.
fn body_json(body: &Bytes) -> Result<Value, serde_json::Error> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}
