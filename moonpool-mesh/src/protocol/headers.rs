//! Header keys shared by routers and workers.
//!
//! Both actor kinds must agree on these names byte for byte.

use http::header::HeaderName;

/// Identity of the RoutingActor that owns the session.
pub const ROUTER_ID: HeaderName = HeaderName::from_static("x-mesh-router-id");

/// Stable identity of the logical client.
pub const CLIENT_ID: HeaderName = HeaderName::from_static("x-mesh-client-id");

/// Identity of the WorkerActor the call is addressed to.
pub const WORKER_ID: HeaderName = HeaderName::from_static("x-mesh-worker-id");

/// Identity of the WorkerActor making a relay or being introduced.
pub const NEIGHBOR_ID: HeaderName = HeaderName::from_static("x-mesh-neighbor-id");

/// Client a whisper relay should be delivered to.
pub const TARGET_ID: HeaderName = HeaderName::from_static("x-mesh-target-id");

/// `"1"` when the client's last socket on the worker closed, `"0"` otherwise.
pub const IS_EMPTY: HeaderName = HeaderName::from_static("x-mesh-is-empty");

/// Encode a boolean for [`IS_EMPTY`].
pub fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
