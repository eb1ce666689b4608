//! In-process stub of the Miguafi API for async tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::Response;
use tokio::sync::Notify;

use crate::api::ApiClient;

/// Canned reply for one `(method, path)` pair.
#[derive(Clone)]
pub struct Reply {
    status: u16,
    body: String,
    gate: Option<Arc<Notify>>,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: body.to_string(), gate: None }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self { status, body: body.to_owned(), gate: None }
    }

    /// Hold the response until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// One request as the stub observed it.
#[derive(Clone, Debug)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone, Default)]
struct StubState {
    routes: Arc<HashMap<(String, String), Reply>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

#[derive(Default)]
pub struct StubBuilder {
    routes: HashMap<(String, String), Reply>,
}

impl StubBuilder {
    pub fn route(mut self, method: &str, path: &str, reply: Reply) -> Self {
        self.routes.insert((method.to_owned(), path.to_owned()), reply);
        self
    }

    pub async fn spawn(self) -> StubServer {
        let state = StubState { routes: Arc::new(self.routes), seen: Arc::default() };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        StubServer { base_url: format!("http://{addr}"), seen: state.seen }
    }
}

pub struct StubServer {
    pub base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl StubServer {
    pub fn builder() -> StubBuilder {
        StubBuilder::default()
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.base_url).unwrap()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Seen {
        self.seen().pop().expect("stub saw no requests")
    }
}

/// Base URL of a port that was bound and released, so connections are refused.
pub async fn closed_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

async fn handle(State(state): State<StubState>, req: Request) -> Response {
    let method = req.method().to_string();
    let route_path = req.uri().path().to_owned();
    let path = req.uri().path_and_query().map_or_else(|| route_path.clone(), |pq| pq.as_str().to_owned());
    let authorization = header_value(req.headers(), header::AUTHORIZATION);
    let content_type = header_value(req.headers(), header::CONTENT_TYPE);
    let body = to_bytes(req.into_body(), usize::MAX)
        .await
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();

    state.seen.lock().unwrap().push(Seen { method: method.clone(), path, authorization, content_type, body });

    let Some(reply) = state.routes.get(&(method, route_path)).cloned() else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("no stub route"))
            .unwrap();
    };
    if let Some(gate) = &reply.gate {
        gate.notified().await;
    }
    Response::builder()
        .status(reply.status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(reply.body))
        .unwrap()
}
