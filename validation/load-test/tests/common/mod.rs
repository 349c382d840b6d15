//! In-process DZI tile server used by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TILE_BYTES: usize = 1024;

pub const DESCRIPTOR: &str = r#"{"Image":{"xmlns":"http://schemas.microsoft.com/deepzoom/2008","Format":"jpg","Overlap":1,"TileSize":254,"Size":{"Height":2967,"Width":2220}}}"#;

/// How the fixture answers tile requests.
#[derive(Clone, Copy)]
pub struct ServerBehavior {
    pub tile_delay: Duration,
    pub fail_tiles: bool,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            tile_delay: Duration::from_millis(5),
            fail_tiles: false,
        }
    }
}

struct ServerState {
    behavior: ServerBehavior,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub struct TileServer {
    pub base_url: String,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl TileServer {
    pub async fn start(behavior: ServerBehavior) -> Self {
        let state = Arc::new(ServerState {
            behavior,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    /// Request paths in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn tile_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|p| p.ends_with(".jpg"))
            .collect()
    }

    /// Most tile requests the server was handling at once.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for TileServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(path.clone());

    if path.ends_with(".dzi") {
        return (StatusCode::OK, DESCRIPTOR).into_response();
    }
    if !(path.contains("_files/") && path.ends_with(".jpg")) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(state.behavior.tile_delay).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if state.behavior.fail_tiles {
        return (StatusCode::INTERNAL_SERVER_ERROR, "tile generation failed").into_response();
    }
    (StatusCode::OK, vec![0xffu8; TILE_BYTES]).into_response()
}
