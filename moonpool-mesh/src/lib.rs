//! # moonpool-mesh
//!
//! Sticky-routed actor clusters with a peer-to-peer messaging mesh.
//!
//! A [`RoutingActor`] sits in front of a set of [`WorkerActor`]s. It keeps
//! every client on the same worker while that worker has room, creates
//! workers when all are full, and introduces new workers to the existing
//! ones. Workers hold client sockets and use their neighbors to reach
//! sockets anywhere in the cluster:
//!
//! - `emit`: every socket on this worker
//! - `broadcast`: every socket on every worker
//! - `whisper`: every socket of one client, wherever it is
//! - `gossip`: ask every neighbor and collect the answers
//!
//! Routers and workers only talk through requests carrying a fixed set of
//! headers (see [`protocol`]); there is no shared memory between actors.
//!
//! ## Execution model
//!
//! Single-threaded. Everything must run inside a `tokio::task::LocalSet`.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = ClusterConfig::builder().limit(2).build()?;
//! let cluster = Cluster::new(config, Rc::new(ByUserHeader), |_| Rc::new(ChatRoom::default()));
//!
//! let mut response = cluster.fetch(&RouterId::from("lobby"), upgrade_request).await?;
//! let socket = take_client_socket(&mut response);
//! ```

#![deny(missing_docs)]

pub mod actors;
pub mod cluster;
pub mod error;
pub mod protocol;
pub mod websocket;

pub use actors::{
    ActorHandler, ActorNamespace, ActorStorage, BoundStub, ClientId, InMemoryStorage, Message,
    RouterId, RoutingActor, RoutingHooks, Socket, WorkerActor, WorkerContext, WorkerHooks,
    WorkerId,
};
pub use cluster::{Cluster, ClusterConfig, ClusterConfigBuilder, ClusterConfigError};
pub use error::{HookError, MeshError, ProtocolError};
pub use protocol::{Request, Response};
pub use websocket::{ClientSocket, Frame, take_client_socket};
