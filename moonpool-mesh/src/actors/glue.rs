//! Reaching a client's worker from outside the cluster.
//!
//! Code that fronts several routers can ask a router which worker serves a
//! client and talk to that worker directly. Calls through the returned
//! [`BoundStub`] carry the routing headers, so the worker accepts them as
//! if they had come through the router. Each such call is a session of its
//! own: unless it upgrades, the worker releases it with the router.

use bytes::Bytes;
use http::{StatusCode, Uri};

use crate::error::MeshError;
use crate::protocol::{ControlRoute, Request, Response, RoutingHeaders, headers, set_header};

use super::namespace::{ActorNamespace, ActorStub};
use super::routing::RoutingActor;
use super::types::{ClientId, RouterId, WorkerId};
use super::worker::WorkerActor;

/// Worker stub that stamps the routing headers onto every call.
#[derive(Debug, Clone)]
pub struct BoundStub {
    stub: ActorStub<WorkerActor>,
    routing: RoutingHeaders,
}

impl BoundStub {
    /// The worker this stub calls.
    pub fn worker_id(&self) -> &WorkerId {
        &self.routing.worker_id
    }

    /// The client the calls are made for.
    pub fn client_id(&self) -> &ClientId {
        &self.routing.client_id
    }

    /// The router that assigned the client.
    pub fn router_id(&self) -> &RouterId {
        &self.routing.router_id
    }

    /// Call the worker.
    pub async fn fetch(&self, mut request: Request) -> Result<Response, MeshError> {
        self.routing.apply(request.headers_mut())?;
        self.stub.fetch(request).await
    }
}

/// Resolve the worker assigned to `client` by `router`.
///
/// Fails with [`MeshError::Remote`] when the router does not know the
/// client (`404`) or rejects the lookup.
pub async fn identify(
    routers: &ActorNamespace<RoutingActor>,
    workers: &ActorNamespace<WorkerActor>,
    router: &RouterId,
    client: &ClientId,
) -> Result<BoundStub, MeshError> {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = Uri::from_static(ControlRoute::Identify.path());
    set_header(request.headers_mut(), headers::ROUTER_ID, router.as_str())?;
    set_header(request.headers_mut(), headers::CLIENT_ID, client.as_str())?;

    let response = routers.get(router).fetch(request).await?;
    let body = String::from_utf8_lossy(response.body()).into_owned();
    if response.status() != StatusCode::OK {
        return Err(MeshError::Remote {
            status: response.status(),
            message: body,
        });
    }

    let worker_id = WorkerId::from(body);
    tracing::debug!(router = %router, client = %client, worker = %worker_id, "identified");
    Ok(BoundStub {
        stub: workers.get(&worker_id),
        routing: RoutingHeaders {
            router_id: router.clone(),
            client_id: client.clone(),
            worker_id,
            target_id: None,
        },
    })
}
