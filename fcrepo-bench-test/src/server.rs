//! Exposes an in-process fake Fedora server for use in integration tests.
//!
//! The server speaks just enough of the Fedora 3 (`/objects`) and Fedora 4 (`/rest`) REST APIs to
//! run a benchmark against it, keeping all resources in memory.
//!
//! ```
//! use fcrepo_bench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/");
//!    // point a FedoraClient at the URL...
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use bytes::Bytes;

#[derive(Debug, Default)]
struct Store {
    /// Live resources by path. Containers map to `None`, binaries to their contents.
    resources: HashMap<String, Option<Bytes>>,
    /// Paths of deleted Fedora 4 resources whose tombstone has not been removed yet.
    tombstones: HashSet<String>,
}

impl Store {
    /// Removes `path` and everything below it, returning whether it existed.
    fn remove_tree(&mut self, path: &str) -> bool {
        let prefix = format!("{path}/");
        let existed = self.resources.remove(path).is_some();
        self.resources.retain(|key, _| !key.starts_with(&prefix));
        existed
    }
}

#[derive(Clone, Debug)]
struct AppState {
    store: Arc<Mutex<Store>>,
    cluster_size: Option<u32>,
    root: String,
}

/// An in-process fake Fedora server for use in integration tests.
///
/// It listens on a random available port on localhost and is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    store: Arc<Mutex<Store>>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_cluster_size(None).await
    }

    /// Creates a server whose Fedora 4 repository description reports `cluster_size` nodes.
    ///
    /// With `None`, the description does not mention a cluster size at all.
    pub async fn with_cluster_size(cluster_size: Option<u32>) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let store = Arc::new(Mutex::new(Store::default()));
        let state = AppState {
            store: Arc::clone(&store),
            cluster_size,
            root: format!("http://localhost:{}/rest/", socket.port()),
        };

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app(state)).await.unwrap();
        });

        Self {
            handle,
            socket,
            store,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Number of live resources, containers and binaries alike.
    pub fn resource_count(&self) -> usize {
        self.store.lock().unwrap().resources.len()
    }

    /// Number of tombstones left behind by deleted Fedora 4 resources.
    pub fn tombstone_count(&self) -> usize {
        self.store.lock().unwrap().tombstones.len()
    }

    /// Returns the contents of the binary at `path`, such as `rest/<id>/ds1`.
    pub fn binary(&self, path: &str) -> Option<Bytes> {
        self.store
            .lock()
            .unwrap()
            .resources
            .get(path.trim_start_matches('/'))
            .cloned()
            .flatten()
    }

    /// Returns `true` if a container or binary exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.store
            .lock()
            .unwrap()
            .resources
            .contains_key(path.trim_start_matches('/'))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/rest", get(describe_repository))
        .route("/rest/{id}", delete(fcrepo4_delete_container).put(fcrepo4_put_container))
        .route(
            "/rest/{id}/{child}",
            get(fcrepo4_get_binary)
                .put(fcrepo4_put_binary)
                .delete(fcrepo4_delete_child),
        )
        .route(
            "/rest/{id}/{child}/fcr:tombstone",
            delete(fcrepo4_delete_binary_tombstone),
        )
        .route("/objects/{pid}", post(fcrepo3_ingest).delete(fcrepo3_purge_object))
        .route(
            "/objects/{pid}/datastreams/{dsid}",
            post(fcrepo3_add_datastream)
                .put(fcrepo3_modify_datastream)
                .delete(fcrepo3_purge_datastream),
        )
        .route(
            "/objects/{pid}/datastreams/{dsid}/content",
            get(fcrepo3_datastream_content),
        )
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn describe_repository(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accepts_ntriples = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/n-triples"));
    if !accepts_ntriples {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }

    let root = &state.root;
    let mut body = format!(
        "<{root}> <http://fedora.info/definitions/v4/repository#objectCount> \"1\"^^<http://www.w3.org/2001/XMLSchema#long> .\n"
    );
    if let Some(size) = state.cluster_size {
        body.push_str(&format!(
            "<{root}> <http://fedora.info/definitions/v4/repository#clusterSize> \"{size}\"^^<http://www.w3.org/2001/XMLSchema#int> .\n"
        ));
    }

    ([(header::CONTENT_TYPE, "application/n-triples")], body).into_response()
}

async fn fcrepo4_put_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    let path = format!("rest/{id}");
    let mut store = state.store.lock().unwrap();
    if store.tombstones.contains(&path) {
        return StatusCode::GONE;
    }
    match store.resources.insert(path, None) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::CREATED,
    }
}

async fn fcrepo4_delete_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    let path = format!("rest/{id}");
    let mut store = state.store.lock().unwrap();
    if !store.remove_tree(&path) {
        return StatusCode::NOT_FOUND;
    }
    store.tombstones.insert(path);
    StatusCode::NO_CONTENT
}

async fn fcrepo4_put_binary(
    State(state): State<AppState>,
    Path((id, child)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    let parent = format!("rest/{id}");
    let path = format!("{parent}/{child}");
    let mut store = state.store.lock().unwrap();
    if !store.resources.contains_key(&parent) {
        return StatusCode::NOT_FOUND;
    }
    if store.tombstones.contains(&path) {
        return StatusCode::GONE;
    }
    match store.resources.insert(path, Some(body)) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::CREATED,
    }
}

async fn fcrepo4_get_binary(
    State(state): State<AppState>,
    Path((id, child)): Path<(String, String)>,
) -> Response {
    let path = format!("rest/{id}/{child}");
    match state.store.lock().unwrap().resources.get(&path) {
        Some(Some(contents)) => contents.clone().into_response(),
        Some(None) => StatusCode::NOT_ACCEPTABLE.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Deletes a child resource, or the tombstone of the container if `child` is `fcr:tombstone`.
async fn fcrepo4_delete_child(
    State(state): State<AppState>,
    Path((id, child)): Path<(String, String)>,
) -> StatusCode {
    let parent = format!("rest/{id}");
    let mut store = state.store.lock().unwrap();

    if child == "fcr:tombstone" {
        return match store.tombstones.remove(&parent) {
            true => StatusCode::NO_CONTENT,
            false => StatusCode::NOT_FOUND,
        };
    }

    let path = format!("{parent}/{child}");
    if !store.remove_tree(&path) {
        return StatusCode::NOT_FOUND;
    }
    store.tombstones.insert(path);
    StatusCode::NO_CONTENT
}

async fn fcrepo4_delete_binary_tombstone(
    State(state): State<AppState>,
    Path((id, child)): Path<(String, String)>,
) -> StatusCode {
    let path = format!("rest/{id}/{child}");
    match state.store.lock().unwrap().tombstones.remove(&path) {
        true => StatusCode::NO_CONTENT,
        false => StatusCode::NOT_FOUND,
    }
}

async fn fcrepo3_ingest(State(state): State<AppState>, Path(pid): Path<String>) -> StatusCode {
    let path = format!("objects/{pid}");
    let mut store = state.store.lock().unwrap();
    if store.resources.contains_key(&path) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    store.resources.insert(path, None);
    StatusCode::CREATED
}

async fn fcrepo3_purge_object(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> StatusCode {
    let path = format!("objects/{pid}");
    match state.store.lock().unwrap().remove_tree(&path) {
        true => StatusCode::OK,
        false => StatusCode::NOT_FOUND,
    }
}

async fn fcrepo3_add_datastream(
    State(state): State<AppState>,
    Path((pid, dsid)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    let parent = format!("objects/{pid}");
    let path = format!("{parent}/{dsid}");
    let mut store = state.store.lock().unwrap();
    if !store.resources.contains_key(&parent) {
        return StatusCode::NOT_FOUND;
    }
    store.resources.insert(path, Some(body));
    StatusCode::CREATED
}

async fn fcrepo3_modify_datastream(
    State(state): State<AppState>,
    Path((pid, dsid)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    let path = format!("objects/{pid}/{dsid}");
    let mut store = state.store.lock().unwrap();
    match store.resources.get_mut(&path) {
        Some(contents) => {
            *contents = Some(body);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn fcrepo3_purge_datastream(
    State(state): State<AppState>,
    Path((pid, dsid)): Path<(String, String)>,
) -> StatusCode {
    let path = format!("objects/{pid}/{dsid}");
    match state.store.lock().unwrap().resources.remove(&path) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn fcrepo3_datastream_content(
    State(state): State<AppState>,
    Path((pid, dsid)): Path<(String, String)>,
) -> Response {
    let path = format!("objects/{pid}/{dsid}");
    match state.store.lock().unwrap().resources.get(&path) {
        Some(Some(contents)) => contents.clone().into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
