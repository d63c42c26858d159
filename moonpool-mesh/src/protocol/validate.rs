//! Boundary validation of the routing header set.

use http::{HeaderMap, HeaderValue};
use http::header::HeaderName;

use crate::actors::{ClientId, RouterId, WorkerId};
use crate::error::{MeshError, ProtocolError};

use super::headers;

/// The routing identities carried by every inter-actor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingHeaders {
    /// Router that owns the session.
    pub router_id: RouterId,
    /// Client the call is about. For neighbor traffic without a client this
    /// is the calling worker's id.
    pub client_id: ClientId,
    /// Worker the call is addressed to.
    pub worker_id: WorkerId,
    /// Whisper target, when present.
    pub target_id: Option<ClientId>,
}

impl RoutingHeaders {
    /// Validate the header set of an inbound call.
    ///
    /// When `receiver` is given, the worker id header must address it.
    pub fn validate(
        map: &HeaderMap,
        receiver: Option<&WorkerId>,
    ) -> Result<Self, ProtocolError> {
        let worker_id = read(map, &headers::WORKER_ID, "Worker ID")?
            .map(WorkerId::from)
            .ok_or(ProtocolError::MissingWorkerId)?;
        if receiver.is_some_and(|own| *own != worker_id) {
            return Err(ProtocolError::WorkerMismatch);
        }

        let router_id = read(map, &headers::ROUTER_ID, "Router ID")?
            .map(RouterId::from)
            .ok_or(ProtocolError::MissingRouterId)?;

        let client_id = match read(map, &headers::CLIENT_ID, "Client ID")? {
            Some(id) => id,
            None => read(map, &headers::NEIGHBOR_ID, "Neighbor ID")?
                .ok_or(ProtocolError::MissingClientId)?,
        };

        let target_id = read(map, &headers::TARGET_ID, "Target ID")?.map(ClientId::from);

        Ok(Self {
            router_id,
            client_id: ClientId::from(client_id),
            worker_id,
            target_id,
        })
    }

    /// Stamp the router, client and worker headers onto an outbound call.
    pub fn apply(&self, map: &mut HeaderMap) -> Result<(), MeshError> {
        set(map, headers::ROUTER_ID, self.router_id.as_str())?;
        set(map, headers::CLIENT_ID, self.client_id.as_str())?;
        set(map, headers::WORKER_ID, self.worker_id.as_str())?;
        if let Some(target) = &self.target_id {
            set(map, headers::TARGET_ID, target.as_str())?;
        }
        Ok(())
    }
}

/// Whether the `x-mesh-is-empty` header is set to `"1"`.
pub(crate) fn is_empty_flag(map: &HeaderMap) -> bool {
    map.get(&headers::IS_EMPTY)
        .is_some_and(|value| value.as_bytes() == b"1")
}

/// Insert a header, rejecting values that cannot be carried on the wire.
pub(crate) fn set(map: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), MeshError> {
    map.insert(name, HeaderValue::from_str(value)?);
    Ok(())
}

/// Read a header as text. Absent is `Ok(None)`; non-text is an error.
pub(crate) fn read(
    map: &HeaderMap,
    name: &HeaderName,
    label: &'static str,
) -> Result<Option<String>, ProtocolError> {
    map.get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| ProtocolError::InvalidHeader(label))
        })
        .transpose()
}
