//! RoutingActor: the front door of one cluster.
//!
//! Picks the worker that serves each client, caps how many sessions a
//! worker carries, creates workers when all are full and introduces them to
//! each other.
//!
//! # Tables
//!
//! Both tables live in the actor's durable storage:
//!
//! | key              | value             |
//! |------------------|-------------------|
//! | `cid:{client}`   | assigned worker   |
//! | `wid:{worker}`   | live session count |
//!
//! Load entries are never deleted; a worker at or above the limit is simply
//! left out of the candidate list.
//!
//! # Selection
//!
//! 1. The client's assigned worker, else the cached current worker, else
//!    the head of the cached candidate list.
//! 2. If that worker is below the limit, take it.
//! 3. Otherwise scan the load table for the least-loaded worker below the
//!    limit.
//! 4. Otherwise create a worker and introduce it to every known worker,
//!    both ways, without waiting.
//!
//! Requests are handled concurrently, so every read-modify-write of the
//! tables holds the router's table lock. The lock is released before the
//! request is forwarded: the worker's close-notify needs it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use futures::future::join_all;
use http::Uri;
use tokio::sync::Mutex;

use crate::error::{MeshError, ProtocolError};
use crate::protocol::{
    ControlRoute, Request, Response, RoutingHeaders, headers, is_empty_flag, read_header,
    set_header, text,
};

use super::hooks::RoutingHooks;
use super::namespace::{ActorHandler, ActorNamespace, ActorState};
use super::storage::{ActorStorage, StorageExt};
use super::types::{ClientId, RouterId, WorkerId};
use super::worker::WorkerActor;

const ASSIGNMENT_PREFIX: &str = "cid:";
const LOAD_PREFIX: &str = "wid:";

fn assignment_key(client: &ClientId) -> String {
    format!("{ASSIGNMENT_PREFIX}{client}")
}

fn load_key(worker: &WorkerId) -> String {
    format!("{LOAD_PREFIX}{worker}")
}

/// Sticky, capacity-bounded router in front of a set of workers.
pub struct RoutingActor {
    id: RouterId,
    storage: Rc<dyn ActorStorage>,
    limit: u32,
    hooks: Rc<dyn RoutingHooks>,
    workers: ActorNamespace<WorkerActor>,
    /// Most recently assigned worker that still had room.
    current: RefCell<Option<WorkerId>>,
    /// Workers below the limit, least loaded first, as of the last scan.
    sorted: RefCell<Vec<WorkerId>>,
    /// Held across every table update.
    tables: Mutex<()>,
}

impl fmt::Debug for RoutingActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingActor")
            .field("id", &self.id)
            .field("limit", &self.limit)
            .field("current", &self.current.borrow())
            .field("sorted", &self.sorted.borrow())
            .finish()
    }
}

impl RoutingActor {
    /// Create a router instance.
    ///
    /// `limit` is the number of live sessions a worker may carry before new
    /// clients go elsewhere.
    pub fn new(
        state: ActorState<RouterId>,
        limit: u32,
        hooks: Rc<dyn RoutingHooks>,
        workers: ActorNamespace<WorkerActor>,
    ) -> Self {
        Self {
            id: state.id,
            storage: state.storage,
            limit,
            hooks,
            workers,
            current: RefCell::new(None),
            sorted: RefCell::new(Vec::new()),
            tables: Mutex::new(()),
        }
    }

    /// This router's identity.
    pub fn id(&self) -> &RouterId {
        &self.id
    }

    /// Per-worker session limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The worker currently assigned to `client`, if any.
    pub async fn assignment(&self, client: &ClientId) -> Result<Option<WorkerId>, MeshError> {
        Ok(self.storage.get_json(&assignment_key(client)).await?)
    }

    /// Every known worker with its live session count, in id order.
    pub async fn load_table(&self) -> Result<Vec<(WorkerId, u32)>, MeshError> {
        let entries: Vec<(String, u32)> = self.storage.list_json(LOAD_PREFIX).await?;
        Ok(entries
            .into_iter()
            .map(|(worker, count)| (WorkerId::from(worker), count))
            .collect())
    }

    /// Pick a worker for the request and forward it there.
    ///
    /// The worker's response is returned unmodified, upgrades included.
    pub async fn route(&self, mut request: Request) -> Result<Response, MeshError> {
        let client_id = self.hooks.identify(&request).await?;
        let worker_id = self.assign(&client_id, &request).await?;

        RoutingHeaders {
            router_id: self.id.clone(),
            client_id,
            worker_id: worker_id.clone(),
            target_id: None,
        }
        .apply(request.headers_mut())?;

        self.workers.get(&worker_id).fetch(request).await
    }

    /// Pick the worker for `client_id` and record the new session.
    async fn assign(
        &self,
        client_id: &ClientId,
        request: &Request,
    ) -> Result<WorkerId, MeshError> {
        let _tables = self.tables.lock().await;

        let candidate = match self.assignment(client_id).await? {
            Some(worker) => Some(worker),
            None => self
                .current
                .borrow()
                .clone()
                .or_else(|| self.sorted.borrow().first().cloned()),
        };

        let mut selected = None;
        if let Some(worker) = candidate {
            let count = self.load(&worker).await?;
            if let Some(count) = count.filter(|count| *count < self.limit) {
                selected = Some((worker, count + 1));
            }
        }

        let (worker_id, count) = match selected {
            Some(found) => found,
            None => match self.least_loaded().await? {
                Some((worker, count)) => (worker, count + 1),
                None => {
                    let worker = self.hooks.clusterize(request, &self.workers).await?;
                    self.welcome(&worker).await?;
                    (worker, 1)
                }
            },
        };

        *self.current.borrow_mut() = (count < self.limit).then(|| worker_id.clone());

        self.storage
            .put_json(&assignment_key(client_id), &worker_id)
            .await?;
        self.storage.put_json(&load_key(&worker_id), &count).await?;

        tracing::debug!(
            router = %self.id,
            client = %client_id,
            worker = %worker_id,
            count,
            "routed"
        );
        Ok(worker_id)
    }

    /// Release one unit of a worker's capacity after a session ended.
    async fn close(&self, request: &Request) -> Result<Response, MeshError> {
        let routing = RoutingHeaders::validate(request.headers(), None)?;
        if routing.router_id != self.id {
            return Err(ProtocolError::RouterMismatch.into());
        }

        let _tables = self.tables.lock().await;
        let key = load_key(&routing.worker_id);
        let count: u32 = self
            .storage
            .get_json(&key)
            .await?
            .ok_or(ProtocolError::UnknownWorker)?;
        let count = count.saturating_sub(1);
        self.storage.put_json(&key, &count).await?;

        let is_empty = is_empty_flag(request.headers());
        if is_empty {
            self.storage
                .delete(&assignment_key(&routing.client_id))
                .await?;
        }

        let best = self.least_loaded().await?;
        *self.current.borrow_mut() = best.map(|(worker, _)| worker);

        tracing::debug!(
            router = %self.id,
            client = %routing.client_id,
            worker = %routing.worker_id,
            count,
            is_empty,
            "session released"
        );
        Ok(text("OK"))
    }

    /// Answer which worker a client is assigned to.
    async fn lookup(&self, request: &Request) -> Result<Response, MeshError> {
        let map = request.headers();
        let router_id = read_header(map, &headers::ROUTER_ID, "Router ID")?
            .ok_or(ProtocolError::MissingRouterId)?;
        if router_id != self.id.as_str() {
            return Err(ProtocolError::RouterMismatch.into());
        }
        let client_id = read_header(map, &headers::CLIENT_ID, "Client ID")?
            .map(ClientId::from)
            .ok_or(ProtocolError::MissingClientId)?;

        match self.assignment(&client_id).await? {
            Some(worker) => Ok(text(worker.as_str())),
            None => Err(ProtocolError::UnknownClient.into()),
        }
    }

    async fn load(&self, worker: &WorkerId) -> Result<Option<u32>, MeshError> {
        Ok(self.storage.get_json(&load_key(worker)).await?)
    }

    /// Rebuild the candidate list from the load table and return its head.
    async fn least_loaded(&self) -> Result<Option<(WorkerId, u32)>, MeshError> {
        let mut loads = self.load_table().await?;
        loads.sort_by_key(|(_, count)| *count);
        loads.retain(|(_, count)| *count < self.limit);

        *self.sorted.borrow_mut() = loads.iter().map(|(worker, _)| worker.clone()).collect();
        Ok(loads.into_iter().next())
    }

    /// Put a new worker at the head of the candidates and introduce it.
    async fn welcome(&self, stranger: &WorkerId) -> Result<(), MeshError> {
        let known: Vec<WorkerId> = self
            .load_table()
            .await?
            .into_iter()
            .map(|(worker, _)| worker)
            .filter(|worker| worker != stranger)
            .collect();
        self.sorted.borrow_mut().insert(0, stranger.clone());

        tracing::info!(
            router = %self.id,
            worker = %stranger,
            neighbors = known.len(),
            "worker created"
        );
        if known.is_empty() {
            return Ok(());
        }

        let mut calls = Vec::with_capacity(known.len() * 2);
        for worker in &known {
            calls.push(introduce(&self.id, &self.workers, stranger, worker)?);
            calls.push(introduce(&self.id, &self.workers, worker, stranger)?);
        }

        let router = self.id.clone();
        tokio::task::spawn_local(async move {
            for (target, result) in join_all(calls).await {
                match result {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => tracing::warn!(
                        router = %router,
                        worker = %target,
                        status = %response.status(),
                        "neighbor introduction rejected"
                    ),
                    Err(err) => tracing::warn!(
                        router = %router,
                        worker = %target,
                        error = %err,
                        "neighbor introduction failed"
                    ),
                }
            }
        });
        Ok(())
    }
}

/// Tell `target` about `stranger`.
///
/// The request is built eagerly so header errors surface to the caller; the
/// returned future performs the call.
fn introduce(
    router: &RouterId,
    workers: &ActorNamespace<WorkerActor>,
    stranger: &WorkerId,
    target: &WorkerId,
) -> Result<impl std::future::Future<Output = (WorkerId, Result<Response, MeshError>)>, MeshError>
{
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = Uri::from_static(ControlRoute::Neighbor.path());
    let map = request.headers_mut();
    set_header(map, headers::WORKER_ID, target.as_str())?;
    set_header(map, headers::NEIGHBOR_ID, stranger.as_str())?;
    set_header(map, headers::ROUTER_ID, router.as_str())?;

    let stub = workers.get(target);
    let target = target.clone();
    Ok(async move {
        let result = stub.fetch(request).await;
        (target, result)
    })
}

#[async_trait::async_trait(?Send)]
impl ActorHandler for RoutingActor {
    type Id = RouterId;

    async fn fetch(&self, request: Request) -> Response {
        let route = ControlRoute::from_path(request.uri().path());
        let result = match route {
            Some(ControlRoute::Close) => self.close(&request).await,
            Some(ControlRoute::Identify) => self.lookup(&request).await,
            _ => self.route(request).await,
        };

        result.unwrap_or_else(|err| {
            match route {
                Some(route) => tracing::debug!(
                    router = %self.id,
                    route = route.name(),
                    error = %err,
                    "control request rejected"
                ),
                None => tracing::warn!(router = %self.id, error = %err, "routing failed"),
            }
            err.into_response()
        })
    }
}
