//! Actor namespace: mints identities and hands out callable stubs.
//!
//! A namespace owns every instance of one actor kind. Calling a stub
//! lazily activates the instance through the bound factory, then queues the
//! request on that instance's mailbox.
//!
//! # Execution model
//!
//! One mailbox and one processing loop per instance, drained in send order.
//! Each envelope runs on its own local task, so an instance that is
//! awaiting an outbound call still accepts inbound ones (a router waiting
//! on a worker must be able to take that worker's close-notify). State
//! mutations between two awaits are therefore exclusive, but a
//! read-compare-write that spans an await is not: capacity limits built on
//! top of this are soft.
//!
//! Everything runs on the current thread; callers must be inside a
//! `tokio::task::LocalSet`.
//!
//! # Durability
//!
//! Storage handed to an instance survives [`ActorNamespace::deactivate`];
//! in-memory fields of the instance do not.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};

use crate::error::MeshError;
use crate::protocol::{Request, Response};

use super::storage::{ActorStorage, InMemoryStorage};
use super::types::ActorIdentity;

/// Creates the storage for a newly seen actor identity.
pub type StorageProvider = Rc<dyn Fn() -> Rc<dyn ActorStorage>>;

/// What an instance receives at activation.
pub struct ActorState<I> {
    /// The instance's own identity.
    pub id: I,
    /// Durable storage scoped to this instance.
    pub storage: Rc<dyn ActorStorage>,
}

/// An actor kind that can live in a namespace.
///
/// `fetch` is the single entry point for client traffic and control
/// messages alike.
#[async_trait::async_trait(?Send)]
pub trait ActorHandler: 'static {
    /// Identity type of instances of this kind.
    type Id: ActorIdentity;

    /// Handle one request.
    async fn fetch(&self, request: Request) -> Response;
}

type Factory<H> = Rc<dyn Fn(ActorState<<H as ActorHandler>::Id>) -> H>;

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

struct Activation<H> {
    instance: Rc<H>,
    mailbox: mpsc::UnboundedSender<Envelope>,
}

struct NamespaceInner<H: ActorHandler> {
    name: String,
    factory: RefCell<Option<Factory<H>>>,
    activations: RefCell<HashMap<H::Id, Activation<H>>>,
    storage: RefCell<HashMap<H::Id, Rc<dyn ActorStorage>>>,
    storage_provider: StorageProvider,
}

/// All instances of one actor kind.
///
/// Cheap to clone; clones share the same instances.
pub struct ActorNamespace<H: ActorHandler> {
    inner: Rc<NamespaceInner<H>>,
}

impl<H: ActorHandler> Clone for ActorNamespace<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: ActorHandler> fmt::Debug for ActorNamespace<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorNamespace")
            .field("name", &self.inner.name)
            .field("active", &self.inner.activations.borrow().len())
            .field("bound", &self.inner.factory.borrow().is_some())
            .finish()
    }
}

impl<H: ActorHandler> ActorNamespace<H> {
    /// Create a namespace whose instances use [`InMemoryStorage`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_storage(
            name,
            Rc::new(|| Rc::new(InMemoryStorage::new()) as Rc<dyn ActorStorage>),
        )
    }

    /// Create a namespace with a custom storage provider.
    pub fn with_storage(name: impl Into<String>, storage_provider: StorageProvider) -> Self {
        Self {
            inner: Rc::new(NamespaceInner {
                name: name.into(),
                factory: RefCell::new(None),
                activations: RefCell::new(HashMap::new()),
                storage: RefCell::new(HashMap::new()),
                storage_provider,
            }),
        }
    }

    /// Bind the factory used to activate instances.
    ///
    /// Binding happens after construction so that namespaces referring to
    /// each other can be wired up.
    pub fn bind(&self, factory: impl Fn(ActorState<H::Id>) -> H + 'static) {
        *self.inner.factory.borrow_mut() = Some(Rc::new(factory));
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mint a fresh identity: 32 random bytes, hex encoded.
    pub fn new_unique_id(&self) -> H::Id {
        let bytes: [u8; 32] = rand::rng().random();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        H::Id::from(hex)
    }

    /// A callable reference to the instance with this identity.
    ///
    /// Nothing is activated until the first call.
    pub fn get(&self, id: &H::Id) -> ActorStub<H> {
        ActorStub {
            namespace: self.clone(),
            id: id.clone(),
        }
    }

    /// The live instance, activating it if needed.
    pub fn instance(&self, id: &H::Id) -> Result<Rc<H>, MeshError> {
        self.ensure_active(id)?;
        self.inner
            .activations
            .borrow()
            .get(id)
            .map(|activation| activation.instance.clone())
            .ok_or_else(|| self.unavailable(id))
    }

    /// Whether an instance is currently activated.
    pub fn is_active(&self, id: &H::Id) -> bool {
        self.inner.activations.borrow().contains_key(id)
    }

    /// Drop the in-memory instance. Its storage is kept.
    ///
    /// Returns whether the instance was active.
    pub fn deactivate(&self, id: &H::Id) -> bool {
        let removed = self.inner.activations.borrow_mut().remove(id);
        if removed.is_some() {
            tracing::debug!(namespace = %self.inner.name, id = %id, "deactivated");
        }
        removed.is_some()
    }

    /// Drop every in-memory instance and the bound factory.
    ///
    /// Namespaces that reference each other through their factories are
    /// released once both are shut down.
    pub fn shutdown(&self) {
        self.inner.factory.borrow_mut().take();
        let drained: Vec<_> = self.inner.activations.borrow_mut().drain().collect();
        tracing::debug!(
            namespace = %self.inner.name,
            count = drained.len(),
            "namespace shut down"
        );
    }

    fn ensure_active(&self, id: &H::Id) -> Result<(), MeshError> {
        if self.is_active(id) {
            return Ok(());
        }

        let factory = self
            .inner
            .factory
            .borrow()
            .clone()
            .ok_or_else(|| MeshError::Unbound(self.inner.name.clone()))?;

        let storage = self
            .inner
            .storage
            .borrow_mut()
            .entry(id.clone())
            .or_insert_with(|| (self.inner.storage_provider)())
            .clone();

        let instance = Rc::new(factory(ActorState {
            id: id.clone(),
            storage,
        }));

        let (mailbox, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(processing_loop(
            self.inner.name.clone(),
            id.clone(),
            instance.clone(),
            rx,
        ));

        self.inner
            .activations
            .borrow_mut()
            .insert(id.clone(), Activation { instance, mailbox });
        tracing::debug!(namespace = %self.inner.name, id = %id, "activated");
        Ok(())
    }

    fn mailbox(&self, id: &H::Id) -> Result<mpsc::UnboundedSender<Envelope>, MeshError> {
        self.ensure_active(id)?;
        self.inner
            .activations
            .borrow()
            .get(id)
            .map(|activation| activation.mailbox.clone())
            .ok_or_else(|| self.unavailable(id))
    }

    fn unavailable(&self, id: &H::Id) -> MeshError {
        MeshError::ActorUnavailable {
            namespace: self.inner.name.clone(),
            id: id.to_string(),
        }
    }
}

/// Mailbox loop for one instance.
///
/// Dequeues in send order and hands each envelope to its own local task.
async fn processing_loop<H: ActorHandler>(
    namespace: String,
    id: H::Id,
    instance: Rc<H>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(Envelope { request, reply }) = mailbox.recv().await {
        let instance = instance.clone();
        tokio::task::spawn_local(async move {
            let response = instance.fetch(request).await;
            // Caller may have given up.
            let _ = reply.send(response);
        });
    }
    tracing::debug!(namespace = %namespace, id = %id, "mailbox closed");
}

/// Callable reference to one actor instance.
///
/// Calls through one stub are queued in order while the instance remains
/// reachable.
pub struct ActorStub<H: ActorHandler> {
    namespace: ActorNamespace<H>,
    id: H::Id,
}

impl<H: ActorHandler> Clone for ActorStub<H> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            id: self.id.clone(),
        }
    }
}

impl<H: ActorHandler> fmt::Debug for ActorStub<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorStub")
            .field("namespace", &self.namespace.name())
            .field("id", &self.id)
            .finish()
    }
}

impl<H: ActorHandler> ActorStub<H> {
    /// Identity of the target instance.
    pub fn id(&self) -> &H::Id {
        &self.id
    }

    /// Send a request and wait for the response.
    pub async fn fetch(&self, request: Request) -> Result<Response, MeshError> {
        let mailbox = self.namespace.mailbox(&self.id)?;
        let (reply, response) = oneshot::channel();
        mailbox
            .send(Envelope { request, reply })
            .map_err(|_| self.namespace.unavailable(&self.id))?;
        response
            .await
            .map_err(|_| self.namespace.unavailable(&self.id))
    }
}
