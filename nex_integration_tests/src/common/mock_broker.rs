use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct BrokerState {
    /// Keyed by path and query without the leading '/'
    documents: RwLock<HashMap<String, String>>,
    delay: RwLock<Option<Duration>>,
    requests: AtomicUsize,
}

impl BrokerState {
    /// Exact path-and-query match first, then path only
    fn lookup(&self, req: &Request<Body>) -> Option<String> {
        let documents = self.documents.read();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .trim_start_matches('/');
        let path = req.uri().path().trim_start_matches('/');

        documents
            .get(path_and_query)
            .or_else(|| documents.get(path))
            .cloned()
    }
}

/// Monitoring HTTP server standing in for a broker
pub struct MockBroker {
    addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockBroker {
    /// Start on a random local port with no documents
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(BrokerState::default());

        let service_state = Arc::clone(&state);
        let make_svc = make_service_fn(move |_conn| {
            let state = Arc::clone(&service_state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle(req, Arc::clone(&state))))
            }
        });

        let server = Server::try_bind(&SocketAddr::from(([127, 0, 0, 1], 0)))?.serve(make_svc);
        let addr = server.local_addr();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                stopped.await.ok();
            });
            if let Err(e) = graceful.await {
                tracing::error!("Mock broker error: {}", e);
            }
        });

        tracing::info!("Mock broker listening on {}", addr);

        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Start serving every `(path, document)` pair
    pub async fn with_documents(documents: Vec<(&str, Value)>) -> anyhow::Result<Self> {
        let broker = Self::start().await?;
        for (path, document) in documents {
            broker.serve_json(path, &document);
        }
        Ok(broker)
    }

    pub fn serve_json(&self, path: &str, document: &Value) {
        self.serve_raw(path, &document.to_string());
    }

    /// Serve an arbitrary body, e.g. malformed JSON
    pub fn serve_raw(&self, path: &str, body: &str) {
        self.state
            .documents
            .write()
            .insert(path.trim_start_matches('/').to_string(), body.to_string());
    }

    /// Delay every response
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.write() = Some(delay);
    }

    /// Monitoring base URL
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Stop listening; subsequent fetches are refused
    pub async fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle(req: Request<Body>, state: Arc<BrokerState>) -> Result<Response<Body>, Infallible> {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let delay = *state.delay.read();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = match state.lookup(&req) {
        Some(body) => Response::new(Body::from(body)),
        None => {
            let mut response = Response::new(Body::from("Not Found"));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    };
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
