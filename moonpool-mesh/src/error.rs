//! Error types for the mesh.
//!
//! Errors are handled by the actor that detects them and turned into a
//! plain-text response (see [`crate::protocol::abort`]). They never travel
//! across an actor boundary as Rust errors: a caller only ever sees a
//! [`Response`](crate::protocol::Response) or a [`MeshError`] describing why
//! the callee could not be reached at all.

use http::StatusCode;

use crate::actors::StorageError;
use crate::protocol::{Response, abort};

/// Validation failures on the inter-actor wire protocol.
///
/// The display strings are part of the protocol: they are the text bodies
/// returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The worker id header is absent.
    #[error("Missing: Worker ID")]
    MissingWorkerId,

    /// The worker id header does not address the receiving worker.
    #[error("Mismatch: Worker ID")]
    WorkerMismatch,

    /// The router id header is absent.
    #[error("Missing: Router ID")]
    MissingRouterId,

    /// The router id header does not address the receiving router.
    #[error("Mismatch: Router ID")]
    RouterMismatch,

    /// Neither a client id nor a neighbor id header is present.
    #[error("Missing: Client ID")]
    MissingClientId,

    /// A neighbor introduction did not name the neighbor.
    #[error("Missing: Neighbor ID")]
    MissingNeighborId,

    /// A whisper relay carried no target.
    #[error("Missing: Target ID")]
    MissingTargetId,

    /// The router has no load entry for the worker named in a close-notify.
    #[error("Unknown: Worker ID")]
    UnknownWorker,

    /// The router has no assignment for the client named in an identify call.
    #[error("Unknown: Client ID")]
    UnknownClient,

    /// A header value could not be parsed or encoded.
    #[error("Invalid: {0}")]
    InvalidHeader(&'static str),

    /// A control route was sent to an actor kind that never handles it.
    #[error("Unsupported: {0}")]
    UnsupportedRoute(&'static str),

    /// The request is not a valid WebSocket upgrade.
    #[error("{reason}")]
    Handshake {
        /// Status to answer with (400, 405 or 426).
        status: StatusCode,
        /// Diagnostic text.
        reason: &'static str,
    },
}

impl ProtocolError {
    /// The status code this error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::UnknownClient => StatusCode::NOT_FOUND,
            ProtocolError::Handshake { status, .. } => *status,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Error raised by a user-supplied hook.
///
/// Hooks are integration points the mesh calls but never implements, so
/// the error only carries diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Create a hook error from any displayable message.
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The diagnostic text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HookError {
    fn from(err: serde_json::Error) -> Self {
        HookError::new(err)
    }
}

impl From<MeshError> for HookError {
    fn from(err: MeshError) -> Self {
        HookError::new(err)
    }
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Wire protocol validation failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A user hook failed.
    #[error("hook error: {0}")]
    Hook(#[from] HookError),

    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The destination actor could not accept or answer the call.
    #[error("actor unavailable: {namespace}/{id}")]
    ActorUnavailable {
        /// Namespace of the destination.
        namespace: String,
        /// Identity of the destination.
        id: String,
    },

    /// No factory was bound to the namespace before the first call.
    #[error("namespace {0} has no actor factory bound")]
    Unbound(String),

    /// A remote actor answered with an error status.
    #[error("remote error ({status}): {message}")]
    Remote {
        /// Status the remote actor answered with.
        status: StatusCode,
        /// Text body of the answer.
        message: String,
    },

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeshError {
    /// The plain-text response an actor answers with when it hits this error.
    ///
    /// Protocol errors keep their own status, hook errors are `400`, and
    /// anything else is an internal failure of the receiving actor.
    pub fn into_response(self) -> Response {
        match self {
            MeshError::Protocol(err) => abort(err.status(), Some(&err.to_string())),
            MeshError::Hook(err) => abort(StatusCode::BAD_REQUEST, Some(err.message())),
            MeshError::Remote { status, message } => abort(status, Some(&message)),
            other => abort(StatusCode::INTERNAL_SERVER_ERROR, Some(&other.to_string())),
        }
    }
}
