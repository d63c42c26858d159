//! Cluster wiring: two namespaces, their hooks and the capacity limit.
//!
//! [`Cluster::new`] fixes the relationships between the router and worker
//! namespaces once: routers forward to workers, workers report back to
//! routers and relay to each other.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClusterConfig::builder().limit(50).build()?;
//! let cluster = Cluster::new(config, Rc::new(MyRouting), |_| Rc::new(MyWorker::default()));
//!
//! let lobby = RouterId::from("lobby");
//! let response = cluster.fetch(&lobby, request).await?;
//! ```

use std::fmt;
use std::rc::Rc;

use crate::actors::{
    ActorNamespace, BoundStub, ClientId, RouterId, RoutingActor, RoutingHooks, StorageProvider,
    WorkerActor, WorkerHooks, WorkerId, WorkerLink,
};
use crate::error::MeshError;
use crate::protocol::{Request, Response};

const DEFAULT_ROUTER_NAMESPACE: &str = "router";
const DEFAULT_WORKER_NAMESPACE: &str = "worker";

/// Settings shared by every actor of a cluster.
#[derive(Clone)]
pub struct ClusterConfig {
    limit: u32,
    router_namespace: String,
    worker_namespace: String,
    storage: Option<StorageProvider>,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("limit", &self.limit)
            .field("router_namespace", &self.router_namespace)
            .field("worker_namespace", &self.worker_namespace)
            .field("custom_storage", &self.storage.is_some())
            .finish()
    }
}

impl ClusterConfig {
    /// Start building a cluster configuration.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder {
            limit: None,
            router_namespace: DEFAULT_ROUTER_NAMESPACE.to_string(),
            worker_namespace: DEFAULT_WORKER_NAMESPACE.to_string(),
            storage: None,
        }
    }

    /// Live sessions a worker carries before new clients go elsewhere.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Name of the router namespace.
    pub fn router_namespace(&self) -> &str {
        &self.router_namespace
    }

    /// Name of the worker namespace.
    pub fn worker_namespace(&self) -> &str {
        &self.worker_namespace
    }
}

/// Builder for [`ClusterConfig`].
pub struct ClusterConfigBuilder {
    limit: Option<u32>,
    router_namespace: String,
    worker_namespace: String,
    storage: Option<StorageProvider>,
}

impl ClusterConfigBuilder {
    /// Set the per-worker session limit. Required.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Name the router namespace (default `"router"`).
    pub fn router_namespace(mut self, name: impl Into<String>) -> Self {
        self.router_namespace = name.into();
        self
    }

    /// Name the worker namespace (default `"worker"`).
    pub fn worker_namespace(mut self, name: impl Into<String>) -> Self {
        self.worker_namespace = name.into();
        self
    }

    /// Create actor storage with `provider` instead of in memory.
    pub fn storage(mut self, provider: StorageProvider) -> Self {
        self.storage = Some(provider);
        self
    }

    /// Build the cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is missing or zero.
    pub fn build(self) -> Result<ClusterConfig, ClusterConfigError> {
        let limit = self.limit.ok_or(ClusterConfigError::MissingLimit)?;
        if limit == 0 {
            return Err(ClusterConfigError::ZeroLimit);
        }

        Ok(ClusterConfig {
            limit,
            router_namespace: self.router_namespace,
            worker_namespace: self.worker_namespace,
            storage: self.storage,
        })
    }
}

/// Errors from building a [`ClusterConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ClusterConfigError {
    /// No limit was provided to the builder.
    #[error("cluster config requires a per-worker limit")]
    MissingLimit,
    /// The limit was zero, which would leave no room on any worker.
    #[error("per-worker limit must be at least 1")]
    ZeroLimit,
}

/// A router namespace and a worker namespace wired together.
pub struct Cluster {
    config: ClusterConfig,
    routers: ActorNamespace<RoutingActor>,
    workers: ActorNamespace<WorkerActor>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("config", &self.config)
            .field("routers", &self.routers)
            .field("workers", &self.workers)
            .finish()
    }
}

impl Cluster {
    /// Create the namespaces and bind their actor factories.
    ///
    /// `worker_hooks` is called once per worker activation, so each worker
    /// can keep its own hook state. Return a shared `Rc` to share it.
    pub fn new(
        config: ClusterConfig,
        routing_hooks: Rc<dyn RoutingHooks>,
        worker_hooks: impl Fn(&WorkerId) -> Rc<dyn WorkerHooks> + 'static,
    ) -> Self {
        let (routers, workers) = match &config.storage {
            Some(provider) => (
                ActorNamespace::with_storage(config.router_namespace.clone(), provider.clone()),
                ActorNamespace::with_storage(config.worker_namespace.clone(), provider.clone()),
            ),
            None => (
                ActorNamespace::new(config.router_namespace.clone()),
                ActorNamespace::new(config.worker_namespace.clone()),
            ),
        };

        let limit = config.limit;
        let children = workers.clone();
        routers.bind(move |state| {
            RoutingActor::new(state, limit, routing_hooks.clone(), children.clone())
        });

        let link = WorkerLink {
            parent: routers.clone(),
            siblings: workers.clone(),
        };
        workers.bind(move |state| {
            let hooks = worker_hooks(&state.id);
            WorkerActor::new(state, hooks, link.clone())
        });

        tracing::info!(
            limit,
            routers = routers.name(),
            workers = workers.name(),
            "cluster created"
        );
        Self {
            config,
            routers,
            workers,
        }
    }

    /// The configuration the cluster was built with.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The router namespace.
    pub fn routers(&self) -> &ActorNamespace<RoutingActor> {
        &self.routers
    }

    /// The worker namespace.
    pub fn workers(&self) -> &ActorNamespace<WorkerActor> {
        &self.workers
    }

    /// The router instance, activating it if needed.
    pub fn router(&self, id: &RouterId) -> Result<Rc<RoutingActor>, MeshError> {
        self.routers.instance(id)
    }

    /// The worker instance, activating it if needed.
    pub fn worker(&self, id: &WorkerId) -> Result<Rc<WorkerActor>, MeshError> {
        self.workers.instance(id)
    }

    /// Send a client request through a router.
    pub async fn fetch(&self, router: &RouterId, request: Request) -> Result<Response, MeshError> {
        self.routers.get(router).fetch(request).await
    }

    /// Resolve the worker a router assigned to `client`.
    pub async fn identify(
        &self,
        router: &RouterId,
        client: &ClientId,
    ) -> Result<BoundStub, MeshError> {
        crate::actors::identify(&self.routers, &self.workers, router, client).await
    }

    /// Drop every actor instance and unbind both namespaces.
    pub fn shutdown(&self) {
        self.routers.shutdown();
        self.workers.shutdown();
    }
}
