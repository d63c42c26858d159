//! Actors of the mesh and the runtime pieces they stand on.
//!
//! ```text
//!   client ──► RoutingActor ──► WorkerActor ◄──► WorkerActor
//!                  │                 │
//!            ActorStorage       SessionPool
//! ```
//!
//! - [`namespace`]: identities, lazy activation, per-instance mailboxes.
//! - [`storage`]: durable per-instance key/value store.
//! - [`routing`]: sticky, capacity-bounded assignment of clients to workers.
//! - [`worker`]: sessions and the neighbor mesh.
//! - [`glue`]: reaching a client's worker from outside the cluster.
//! - [`hooks`]: the integration points users implement.

pub mod glue;
pub mod hooks;
pub mod namespace;
pub mod routing;
pub mod storage;
pub mod types;
pub mod worker;

pub use glue::{BoundStub, identify};
pub use hooks::{RoutingHooks, WorkerHooks};
pub use namespace::{ActorHandler, ActorNamespace, ActorState, ActorStub, StorageProvider};
pub use routing::RoutingActor;
pub use storage::{ActorStorage, InMemoryStorage, StorageError, StorageExt};
pub use types::{ActorIdentity, ClientId, Message, RouterId, SessionId, WorkerId};
pub use worker::{Socket, WorkerActor, WorkerContext, WorkerLink};
