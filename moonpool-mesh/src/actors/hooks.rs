//! User-supplied integration points.
//!
//! The mesh calls these but never implements them. Only
//! [`RoutingHooks::identify`] and [`WorkerHooks::receive`] are required;
//! everything else has a default.

use serde_json::Value;

use crate::error::HookError;
use crate::protocol::{Request, Response};

use super::namespace::ActorNamespace;
use super::types::{ClientId, WorkerId};
use super::worker::{Socket, WorkerActor, WorkerContext};

/// Hooks consulted by the [`RoutingActor`](super::RoutingActor).
#[async_trait::async_trait(?Send)]
pub trait RoutingHooks: 'static {
    /// Derive the client identity of a request.
    ///
    /// Must return the same id for the same logical client across
    /// reconnects, or sticky routing does nothing.
    async fn identify(&self, request: &Request) -> Result<ClientId, HookError>;

    /// Mint the id of a new worker when every known worker is full.
    async fn clusterize(
        &self,
        _request: &Request,
        workers: &ActorNamespace<WorkerActor>,
    ) -> Result<WorkerId, HookError> {
        Ok(workers.new_unique_id())
    }
}

/// Hooks consulted by the [`WorkerActor`].
///
/// [`Cluster::new`](crate::Cluster::new) asks for hooks once per worker
/// activation, so state kept here can be worker-local.
#[async_trait::async_trait(?Send)]
pub trait WorkerHooks: 'static {
    /// Serve a client request.
    ///
    /// Call [`WorkerContext::connect`] to upgrade it to a socket; any other
    /// answer is treated as a one-shot session and released right away.
    async fn receive(&self, ctx: &WorkerContext, request: Request) -> Result<Response, HookError>;

    /// A socket was accepted. An error rejects the upgrade.
    async fn on_open(&self, _socket: &Socket) -> Result<(), HookError> {
        Ok(())
    }

    /// The client sent a message.
    async fn on_message(&self, _socket: &Socket, _data: String) -> Result<(), HookError> {
        Ok(())
    }

    /// The socket closed.
    async fn on_close(&self, _socket: &Socket) -> Result<(), HookError> {
        Ok(())
    }

    /// The socket failed.
    async fn on_error(&self, _socket: &Socket) -> Result<(), HookError> {
        Ok(())
    }

    /// Answer gossip from a neighbor worker.
    async fn on_gossip(&self, _message: Value) -> Result<Value, HookError> {
        Err(HookError::new("Missing: `on_gossip` handler"))
    }
}
