//! OpenStack API Simulator
//!
//! A small axum server standing in for the three OpenStack APIs the Octavia
//! controller calls:
//!
//! - Keystone: `GET /identity/v3/projects?name=<name>`
//! - Nova: `GET|PUT /compute/os-quota-sets/{project_id}`
//! - Neutron: `GET|PUT /networking/v2.0/quotas/{project_id}`
//!
//! State lives in memory and can be inspected or altered by tests while the
//! server runs (out-of-band quota edits, injected outages).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let sim = openstack_api_sim::spawn(openstack_api_sim::SimState::new()).await?;
//! let project_id = sim.state.register_project("service").await;
//! println!("{} {}", sim.identity_url(), project_id);
//! # Ok(())
//! # }
//! ```

use axum::{
    extract::{Path, Query, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Nova defaults for a project nobody configured yet
pub const DEFAULT_COMPUTE_QUOTA: [(&str, i64); 5] = [
    ("ram", 100),
    ("cores", 100),
    ("instances", 50),
    ("server_groups", 10),
    ("server_group_members", 10),
];

/// Neutron defaults for a project nobody configured yet
pub const DEFAULT_NETWORK_QUOTA: [(&str, i64); 3] =
    [("port", 500), ("security_group", 10), ("security_group_rule", 100)];

/// One request seen by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Default)]
struct Store {
    /// Project name to id
    projects: HashMap<String, String>,
    compute: HashMap<String, BTreeMap<String, i64>>,
    network: HashMap<String, BTreeMap<String, i64>>,
    requests: Vec<RecordedRequest>,
    /// Requests still to be answered with 503
    failures_remaining: u32,
}

/// Shared simulator state
#[derive(Clone, Debug, Default)]
pub struct SimState {
    store: Arc<RwLock<Store>>,
}

impl SimState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project and return its id
    pub async fn register_project(&self, name: &str) -> String {
        let id = format!("{name}-id");
        self.store
            .write()
            .await
            .projects
            .insert(name.to_string(), id.clone());
        id
    }

    /// Answer the next `count` requests with 503 Service Unavailable
    pub async fn fail_next(&self, count: u32) {
        self.store.write().await.failures_remaining = count;
    }

    pub async fn compute_quota(&self, project_id: &str) -> BTreeMap<String, i64> {
        let store = self.store.read().await;
        store
            .compute
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| defaults(&DEFAULT_COMPUTE_QUOTA))
    }

    pub async fn network_quota(&self, project_id: &str) -> BTreeMap<String, i64> {
        let store = self.store.read().await;
        store
            .network
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| defaults(&DEFAULT_NETWORK_QUOTA))
    }

    /// Change one compute limit behind the controller's back
    pub async fn set_compute_limit(&self, project_id: &str, key: &str, value: i64) {
        let mut store = self.store.write().await;
        store
            .compute
            .entry(project_id.to_string())
            .or_insert_with(|| defaults(&DEFAULT_COMPUTE_QUOTA))
            .insert(key.to_string(), value);
    }

    /// Every request answered so far, oldest first
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.store.read().await.requests.clone()
    }

    /// Number of PUT requests answered so far
    pub async fn put_count(&self) -> usize {
        self.store
            .read()
            .await
            .requests
            .iter()
            .filter(|r| r.method == Method::PUT)
            .count()
    }

    async fn has_project_id(&self, project_id: &str) -> bool {
        self.store
            .read()
            .await
            .projects
            .values()
            .any(|id| id == project_id)
    }
}

fn defaults(values: &[(&str, i64)]) -> BTreeMap<String, i64> {
    values
        .iter()
        .map(|(key, value)| ((*key).to_string(), *value))
        .collect()
}

/// Record every request and serve injected outages
async fn fault_middleware(State(state): State<SimState>, request: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
    };
    info!("→ {} {}", recorded.method, recorded.path);

    let fail = {
        let mut store = state.store.write().await;
        store.requests.push(recorded);
        if store.failures_remaining > 0 {
            store.failures_remaining -= 1;
            true
        } else {
            false
        }
    };
    if fail {
        warn!("injected outage, answering 503");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
struct ProjectQuery {
    name: Option<String>,
}

async fn list_projects(
    State(state): State<SimState>,
    Query(query): Query<ProjectQuery>,
) -> Json<Value> {
    let store = state.store.read().await;
    let projects: Vec<Value> = store
        .projects
        .iter()
        .filter(|(name, _)| query.name.as_ref().is_none_or(|wanted| wanted == *name))
        .map(|(name, id)| json!({ "id": id, "name": name }))
        .collect();
    Json(json!({ "projects": projects }))
}

/// Which quota table a route serves
#[derive(Debug, Clone, Copy)]
enum Family {
    Compute,
    Network,
}

impl Family {
    fn envelope(self) -> &'static str {
        match self {
            Family::Compute => "quota_set",
            Family::Network => "quota",
        }
    }
}

async fn read_quota(state: &SimState, family: Family, project_id: &str) -> Response {
    if !state.has_project_id(project_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    let limits = match family {
        Family::Compute => state.compute_quota(project_id).await,
        Family::Network => state.network_quota(project_id).await,
    };
    let mut body: Map<String, Value> = limits
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();
    if matches!(family, Family::Compute) {
        body.insert("id".to_string(), Value::from(project_id));
    }
    let mut envelope = Map::new();
    envelope.insert(family.envelope().to_string(), Value::Object(body));
    Json(Value::Object(envelope)).into_response()
}

async fn write_quota(state: &SimState, family: Family, project_id: &str, body: &Value) -> Response {
    if !state.has_project_id(project_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(update) = body.get(family.envelope()).and_then(Value::as_object) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("missing {} envelope", family.envelope()) })),
        )
            .into_response();
    };
    {
        let mut store = state.store.write().await;
        let (table, fallback) = match family {
            Family::Compute => (&mut store.compute, &DEFAULT_COMPUTE_QUOTA[..]),
            Family::Network => (&mut store.network, &DEFAULT_NETWORK_QUOTA[..]),
        };
        let limits = table
            .entry(project_id.to_string())
            .or_insert_with(|| defaults(fallback));
        for (key, value) in update {
            if let Some(value) = value.as_i64() {
                limits.insert(key.clone(), value);
            }
        }
    }
    read_quota(state, family, project_id).await
}

async fn get_compute(State(state): State<SimState>, Path(project_id): Path<String>) -> Response {
    read_quota(&state, Family::Compute, &project_id).await
}

async fn put_compute(
    State(state): State<SimState>,
    Path(project_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    write_quota(&state, Family::Compute, &project_id, &body).await
}

async fn get_network(State(state): State<SimState>, Path(project_id): Path<String>) -> Response {
    read_quota(&state, Family::Network, &project_id).await
}

async fn put_network(
    State(state): State<SimState>,
    Path(project_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    write_quota(&state, Family::Network, &project_id, &body).await
}

/// Keystone, Nova and Neutron routes over one state
pub fn router(state: SimState) -> Router {
    Router::new()
        .route("/identity/v3/projects", get(list_projects))
        .route(
            "/compute/os-quota-sets/{project_id}",
            get(get_compute).put(put_compute),
        )
        .route(
            "/networking/v2.0/quotas/{project_id}",
            get(get_network).put(put_network),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(state.clone(), fault_middleware)),
        )
        .with_state(state)
}

/// A simulator running on a local port
#[derive(Debug)]
pub struct SimServer {
    pub addr: SocketAddr,
    pub state: SimState,
    handle: tokio::task::JoinHandle<()>,
}

impl SimServer {
    #[must_use]
    pub fn identity_url(&self) -> String {
        format!("http://{}/identity", self.addr)
    }

    #[must_use]
    pub fn compute_url(&self) -> String {
        format!("http://{}/compute", self.addr)
    }

    #[must_use]
    pub fn network_url(&self) -> String {
        format!("http://{}/networking", self.addr)
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `state` on an ephemeral port of 127.0.0.1
///
/// # Errors
///
/// Returns an error if no local port can be bound.
pub async fn spawn(state: SimState) -> anyhow::Result<SimServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve(listener, state).await
}

/// Serve `state` on an already bound listener
///
/// # Errors
///
/// Returns an error if the listener has no local address.
pub async fn serve(listener: TcpListener, state: SimState) -> anyhow::Result<SimServer> {
    let addr = listener.local_addr()?;
    let app = router(state.clone());
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("simulator stopped: {}", e);
        }
    });
    info!("OpenStack API simulator listening on {}", addr);
    Ok(SimServer {
        addr,
        state,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_project_lookup_by_name() {
        let state = SimState::new();
        state.register_project("service").await;
        state.register_project("admin").await;
        let server = TestServer::new(router(state)).unwrap();

        let body: Value = server
            .get("/identity/v3/projects")
            .add_query_param("name", "service")
            .await
            .json();
        assert_eq!(body["projects"].as_array().unwrap().len(), 1);
        assert_eq!(body["projects"][0]["id"], "service-id");
    }

    #[tokio::test]
    async fn test_put_merges_into_defaults() {
        let state = SimState::new();
        let id = state.register_project("service").await;
        let server = TestServer::new(router(state.clone())).unwrap();

        let body: Value = server
            .put(&format!("/compute/os-quota-sets/{id}"))
            .json(&json!({ "quota_set": { "ram": -1 } }))
            .await
            .json();
        assert_eq!(body["quota_set"]["ram"], -1);
        assert_eq!(body["quota_set"]["cores"], 100);
        assert_eq!(state.compute_quota(&id).await["ram"], -1);
        assert_eq!(state.put_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let server = TestServer::new(router(SimState::new())).unwrap();
        server
            .get("/networking/v2.0/quotas/nope")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_injected_outage_then_recovery() {
        let state = SimState::new();
        let id = state.register_project("service").await;
        state.fail_next(1).await;
        let server = TestServer::new(router(state)).unwrap();

        let path = format!("/networking/v2.0/quotas/{id}");
        server
            .get(&path)
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = server.get(&path).await.json();
        assert_eq!(body["quota"]["port"], 500);
    }
}
