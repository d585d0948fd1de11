//! In-process fake of the cluster endpoints used by the provider
//!
//! Only the root endpoint and the role endpoints of the security plugin are served. The fake
//! answers with the status codes and bodies of a real cluster, so that error handling can be
//! tested without a running cluster.

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    Json, Router,
    extract::{OriginalUri, Path, Request, State},
    http::{StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot};

const SERVER_FLAGS: [&str; 3] = ["reserved", "hidden", "static"];

struct ClusterState {
    root: Value,
    security_prefix: Option<&'static str>,
    authorization: Option<&'static str>,
    roles: BTreeMap<String, Value>,
    put_count: usize,
    last_put_body: Option<Value>,
}

type SharedState = Arc<Mutex<ClusterState>>;

pub struct FakeCluster {
    addr: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeCluster {
    /// Starts a fake OpenSearch cluster with the security plugin under `_plugins`
    pub async fn opensearch(version: &str) -> Self {
        let root = json!({
            "name": "opensearch-node-1",
            "cluster_name": "opensearch-cluster",
            "version": {
                "distribution": "opensearch",
                "number": version,
            },
            "tagline": "The OpenSearch Project: https://opensearch.org/"
        });
        Self::start(root, Some("_plugins")).await
    }

    /// Starts a fake Elasticsearch cluster
    ///
    /// The OpenDistro security plugin under `_opendistro` is only available as of version 7.
    pub async fn elasticsearch(version: &str) -> Self {
        let major: u64 = version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .expect("the version should start with the major version");
        let root = json!({
            "name": "elasticsearch-node-1",
            "cluster_name": "elasticsearch-cluster",
            "version": {
                "number": version,
                "build_flavor": "oss",
            },
            "tagline": "You Know, for Search"
        });
        Self::start(root, (major >= 7).then_some("_opendistro")).await
    }

    /// Rejects all requests without the given `Authorization` header
    pub fn require_authorization(self, authorization: &'static str) -> Self {
        self.lock().authorization = Some(authorization);
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of successful role writes
    pub fn put_count(&self) -> usize {
        self.lock().put_count
    }

    /// Body of the last successful role write
    pub fn last_put_body(&self) -> Option<Value> {
        self.lock().last_put_body.clone()
    }

    async fn start(root: Value, security_prefix: Option<&'static str>) -> Self {
        let state = Arc::new(Mutex::new(ClusterState {
            root,
            security_prefix,
            authorization: None,
            roles: BTreeMap::from([("all_access".to_owned(), all_access_role())]),
            put_count: 0,
            last_put_body: None,
        }));

        let router = Router::new()
            .route("/", get(get_root))
            .route(
                "/{prefix}/_security/api/roles/{name}",
                get(get_role).put(put_role).delete(delete_role),
            )
            .fallback(no_handler)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                check_authorization,
            ))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("a local port should be available");
        let addr = listener.local_addr().expect("the listener should be bound");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        FakeCluster {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        lock(&self.state)
    }
}

impl Drop for FakeCluster {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn lock(state: &SharedState) -> MutexGuard<'_, ClusterState> {
    state.lock().expect("the fake cluster state should not be poisoned")
}

fn all_access_role() -> Value {
    json!({
        "reserved": true,
        "hidden": false,
        "description": "Allow full access to all indices and all cluster APIs",
        "cluster_permissions": ["*"],
        "index_permissions": [
            {
                "index_patterns": ["*"],
                "fls": [],
                "masked_fields": [],
                "allowed_actions": ["*"]
            }
        ],
        "tenant_permissions": [
            {
                "tenant_patterns": ["*"],
                "allowed_actions": ["kibana_all_write"]
            }
        ],
        "static": true
    })
}

fn is_read_only(role: &Value) -> bool {
    role["reserved"].as_bool().unwrap_or_default() || role["static"].as_bool().unwrap_or_default()
}

fn status_response(status: StatusCode, message: String) -> Response {
    let body = json!({
        "status": status.canonical_reason().unwrap_or_default().to_uppercase().replace(' ', "_"),
        "message": message,
    });
    (status, Json(body)).into_response()
}

fn not_found(name: &str) -> Response {
    status_response(StatusCode::NOT_FOUND, format!("Resource '{name}' not found."))
}

async fn no_handler(OriginalUri(uri): OriginalUri) -> Response {
    no_handler_response(&uri)
}

fn no_handler_response(uri: &Uri) -> Response {
    let body = json!({
        "error": {
            "root_cause": [{"type": "illegal_argument_exception", "reason": format!("no handler found for uri [{uri}]")}],
            "type": "illegal_argument_exception",
            "reason": format!("no handler found for uri [{uri}]"),
        },
        "status": 400
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn check_authorization(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let required = lock(&state).authorization;
    let authorized = required.is_none_or(|required| {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some(required)
    });

    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

async fn get_root(State(state): State<SharedState>) -> Json<Value> {
    Json(lock(&state).root.clone())
}

async fn get_role(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    Path((prefix, name)): Path<(String, String)>,
) -> Response {
    let state = lock(&state);
    if state.security_prefix != Some(prefix.as_str()) {
        return no_handler_response(&uri);
    }

    match state.roles.get(&name) {
        Some(role) => Json(json!({ name.clone(): role })).into_response(),
        None => not_found(&name),
    }
}

async fn put_role(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    Path((prefix, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = lock(&state);
    if state.security_prefix != Some(prefix.as_str()) {
        return no_handler_response(&uri);
    }

    if state.roles.get(&name).is_some_and(is_read_only) {
        return status_response(
            StatusCode::FORBIDDEN,
            format!("Resource '{name}' is read-only."),
        );
    }

    let Some(document) = body.as_object() else {
        return status_response(StatusCode::BAD_REQUEST, "Invalid JSON".to_owned());
    };
    let invalid_keys: Vec<&str> = SERVER_FLAGS
        .into_iter()
        .filter(|flag| document.contains_key(*flag))
        .collect();
    if !invalid_keys.is_empty() {
        let body = json!({
            "status": "error",
            "reason": "Invalid configuration",
            "invalid_keys": {"keys": invalid_keys.join(",")}
        });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let mut stored = document.clone();
    for flag in SERVER_FLAGS {
        stored.insert(flag.to_owned(), Value::Bool(false));
    }

    state.put_count += 1;
    state.last_put_body = Some(body.clone());
    let existed = state
        .roles
        .insert(name.clone(), Value::Object(stored))
        .is_some();

    if existed {
        status_response(StatusCode::OK, format!("'{name}' updated."))
    } else {
        status_response(StatusCode::CREATED, format!("'{name}' created."))
    }
}

async fn delete_role(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    Path((prefix, name)): Path<(String, String)>,
) -> Response {
    let mut state = lock(&state);
    if state.security_prefix != Some(prefix.as_str()) {
        return no_handler_response(&uri);
    }

    match state.roles.get(&name) {
        Some(role) if is_read_only(role) => status_response(
            StatusCode::FORBIDDEN,
            format!("Resource '{name}' is read-only."),
        ),
        Some(_) => {
            state.roles.remove(&name);
            status_response(StatusCode::OK, format!("'{name}' deleted."))
        }
        None => not_found(&name),
    }
}
