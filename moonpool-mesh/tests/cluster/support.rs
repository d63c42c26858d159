//! Shared fixtures: a chat-style cluster with recording hooks.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::{HeaderValue, StatusCode, Uri};
use moonpool_mesh::protocol::text;
use moonpool_mesh::{
    ClientId, ClientSocket, Cluster, ClusterConfig, HookError, Request, Response, RouterId,
    RoutingActor, RoutingHooks, Socket, WorkerContext, WorkerHooks, WorkerId, take_client_socket,
};
use serde_json::{Value, json};

pub const USER_HEADER: &str = "x-user";

/// Run a test inside a current-thread runtime and a `LocalSet`.
pub fn run_local_test<F: std::future::Future<Output = ()>>(f: F) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime");
    tokio::task::LocalSet::new().block_on(&rt, f);
}

/// Let spawned introductions, relays and session cleanups run.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Client identity from the `x-user` header.
pub struct ByUserHeader;

#[async_trait::async_trait(?Send)]
impl RoutingHooks for ByUserHeader {
    async fn identify(&self, request: &Request) -> Result<ClientId, HookError> {
        request
            .headers()
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ClientId::from)
            .ok_or_else(|| HookError::new("Missing: user"))
    }
}

/// Chat room hooks driven by text commands.
///
/// Socket messages:
/// - `emit:<text>`
/// - `broadcast:<text>` / `broadcast-all:<text>`
/// - `whisper:<client>:<text>`
/// - `close`
///
/// Plain requests:
/// - `/ws` upgrades
/// - `/announce` broadcasts from the worker
/// - `/gossip` gossips and answers the number of payloads
/// - anything else answers `hello`
#[derive(Default)]
pub struct ChatHooks {
    pub events: RefCell<Vec<String>>,
    pub gossip_calls: Cell<usize>,
}

impl ChatHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn record(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

#[async_trait::async_trait(?Send)]
impl WorkerHooks for ChatHooks {
    async fn receive(&self, ctx: &WorkerContext, request: Request) -> Result<Response, HookError> {
        match request.uri().path() {
            "/ws" => Ok(ctx.connect(request).await),
            "/announce" => {
                ctx.broadcast("news").await;
                Ok(text("announced"))
            }
            "/gossip" => {
                let message = serde_json::from_slice::<Value>(request.body())
                    .unwrap_or_else(|_| json!({ "q": "who" }));
                let payloads = ctx.gossip(&message).await?;
                Ok(text(payloads.len().to_string()))
            }
            "/fail" => Err(HookError::new("receive exploded")),
            _ => Ok(text("hello")),
        }
    }

    async fn on_open(&self, socket: &Socket) -> Result<(), HookError> {
        if socket.uid().as_str() == "mallory" {
            return Err(HookError::new("Banned"));
        }
        self.record(format!("open:{}", socket.uid()));
        Ok(())
    }

    async fn on_message(&self, socket: &Socket, data: String) -> Result<(), HookError> {
        if let Some(rest) = data.strip_prefix("emit:") {
            socket.emit(rest, false);
        } else if let Some(rest) = data.strip_prefix("broadcast-all:") {
            socket.broadcast(rest, true).await;
        } else if let Some(rest) = data.strip_prefix("broadcast:") {
            socket.broadcast(rest, false).await;
        } else if let Some(rest) = data.strip_prefix("whisper:") {
            let (target, message) = rest
                .split_once(':')
                .ok_or_else(|| HookError::new("bad whisper"))?;
            socket.whisper(&ClientId::from(target), message).await;
        } else if data == "close" {
            socket.close(4000, "bye");
        } else if data == "json" {
            socket
                .send(json!({ "from": socket.uid().as_str() }))
                .map_err(HookError::new)?;
        }
        Ok(())
    }

    async fn on_close(&self, socket: &Socket) -> Result<(), HookError> {
        self.record(format!("close:{}", socket.uid()));
        Ok(())
    }

    async fn on_error(&self, socket: &Socket) -> Result<(), HookError> {
        self.record(format!("error:{}", socket.uid()));
        Ok(())
    }

    async fn on_gossip(&self, message: Value) -> Result<Value, HookError> {
        self.gossip_calls.set(self.gossip_calls.get() + 1);
        if message.get("fail").is_some() {
            return Err(HookError::new("gossip refused"));
        }
        Ok(json!({ "seen": message }))
    }
}

/// A cluster with one router in front, plus helpers to drive it.
pub struct Harness {
    pub cluster: Cluster,
    pub hooks: Rc<ChatHooks>,
    pub router_id: RouterId,
}

impl Harness {
    /// Every worker shares one [`ChatHooks`], exposed as `hooks`.
    pub fn new(limit: u32) -> Self {
        let hooks = Rc::new(ChatHooks::default());
        let shared = hooks.clone();
        let mut harness =
            Self::with_worker_hooks(limit, move |_| -> Rc<dyn WorkerHooks> { shared.clone() });
        harness.hooks = hooks;
        harness
    }

    /// Build worker hooks per activation with `factory`.
    pub fn with_worker_hooks(
        limit: u32,
        factory: impl Fn(&WorkerId) -> Rc<dyn WorkerHooks> + 'static,
    ) -> Self {
        let config = ClusterConfig::builder()
            .limit(limit)
            .build()
            .expect("valid config");
        let cluster = Cluster::new(config, Rc::new(ByUserHeader), factory);
        Self {
            cluster,
            hooks: Rc::new(ChatHooks::default()),
            router_id: RouterId::from("lobby"),
        }
    }

    pub fn router(&self) -> Rc<RoutingActor> {
        self.cluster
            .router(&self.router_id)
            .expect("router activates")
    }

    pub async fn send(&self, request: Request) -> Response {
        self.cluster
            .fetch(&self.router_id, request)
            .await
            .expect("router reachable")
    }

    /// Open a socket for `user` and return the client end.
    pub async fn connect(&self, user: &str) -> ClientSocket {
        let mut response = self.send(upgrade_request(user)).await;
        assert_eq!(
            response.status(),
            StatusCode::SWITCHING_PROTOCOLS,
            "upgrade for {user} failed: {}",
            body_text(&response)
        );
        take_client_socket(&mut response).expect("client socket attached")
    }

    pub async fn get(&self, user: &str, path: &'static str) -> Response {
        self.send(plain_request(user, path)).await
    }

    pub async fn worker_of(&self, user: &str) -> Option<WorkerId> {
        self.router()
            .assignment(&ClientId::from(user))
            .await
            .expect("storage readable")
    }

    pub async fn load_of(&self, worker: &WorkerId) -> Option<u32> {
        self.router()
            .load_table()
            .await
            .expect("storage readable")
            .into_iter()
            .find(|(id, _)| id == worker)
            .map(|(_, count)| count)
    }

    pub async fn load_table(&self) -> Vec<(WorkerId, u32)> {
        self.router().load_table().await.expect("storage readable")
    }

    pub fn neighbors_of(&self, worker: &WorkerId) -> Vec<WorkerId> {
        self.cluster
            .worker(worker)
            .expect("worker activates")
            .neighbors()
    }
}

pub fn plain_request(user: &str, path: &'static str) -> Request {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = Uri::from_static(path);
    request
        .headers_mut()
        .insert(USER_HEADER, HeaderValue::from_str(user).expect("ascii user"));
    request
}

pub fn upgrade_request(user: &str) -> Request {
    let mut request = plain_request(user, "/ws");
    let headers = request.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(
        SEC_WEBSOCKET_KEY,
        HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="),
    );
    headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    request
}

pub fn body_text(response: &Response) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}
