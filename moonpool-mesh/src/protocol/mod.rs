//! Inter-actor wire protocol.
//!
//! Routers and workers are independently addressed units, so the only
//! contract between them is a fixed vocabulary of header keys and control
//! paths multiplexed through each actor's single `fetch` entry point.
//!
//! ```text
//!  client ──► RoutingActor.fetch ──(x-mesh-* headers)──► WorkerActor.fetch
//!                  ▲                                         │
//!                  └──────────── /~mesh~/close ◄─────────────┘
//!
//!  WorkerActor ──/~mesh~/{broadcast,whisper,gossip}──► neighbor WorkerActor
//!  RoutingActor ──/~mesh~/neighbor──► WorkerActor
//! ```
//!
//! Everything here is validated once at the boundary: [`ControlRoute`]
//! classifies the path and [`RoutingHeaders::validate`] checks the header
//! set before any actor state is touched.

pub mod handshake;
pub mod headers;
mod response;
mod routes;
mod validate;

pub use response::{abort, empty, json, text};
pub use routes::ControlRoute;
pub use validate::RoutingHeaders;
pub(crate) use validate::{is_empty_flag, read as read_header, set as set_header};

/// Request type flowing between clients and actors.
pub type Request = http::Request<bytes::Bytes>;

/// Response type flowing between actors and clients.
pub type Response = http::Response<bytes::Bytes>;
