use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tempfile::TempDir;

use bearer_guard::{
    ApiClient, ClientConfig, CredentialStore, LoginNavigator, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN,
    KEY_USER,
};

/// Mock API state shared with the axum handlers. Tokens rotate to the fixed
/// `next_*` values on the first successful refresh.
pub struct ApiState {
    pub valid_access: Mutex<String>,
    pub valid_refresh: Mutex<String>,
    pub next_access: String,
    pub next_refresh: String,
    pub refresh_calls: AtomicUsize,
    pub data_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub always_unauthorized: AtomicBool,
    pub require_auth: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    pub data_auth_seen: Mutex<Vec<Option<String>>>,
}

impl ApiState {
    fn new() -> Self {
        Self {
            valid_access: Mutex::new("A1".to_string()),
            valid_refresh: Mutex::new("R1".to_string()),
            next_access: "A2".to_string(),
            next_refresh: "R2".to_string(),
            refresh_calls: AtomicUsize::new(0),
            data_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            always_unauthorized: AtomicBool::new(false),
            require_auth: AtomicBool::new(true),
            refresh_delay_ms: AtomicU64::new(0),
            data_auth_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct RecordingNavigator {
    pub redirects: Arc<AtomicUsize>,
}

impl LoginNavigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestHarness {
    pub client: ApiClient,
    pub store: CredentialStore,
    pub api: Arc<ApiState>,
    pub redirects: Arc<AtomicUsize>,
    _store_dir: TempDir,
}

impl TestHarness {
    pub fn seed_credentials(&self, access: &str, refresh: &str) {
        self.store.set(KEY_ACCESS_TOKEN, access).expect("seed access token");
        self.store.set(KEY_REFRESH_TOKEN, refresh).expect("seed refresh token");
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.store.get(key).expect("read store")
    }

    pub fn store_is_empty(&self) -> bool {
        [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER]
            .iter()
            .all(|key| self.stored(key).is_none())
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

pub async fn spawn_harness() -> TestHarness {
    bearer_guard::logging::init();

    let api = Arc::new(ApiState::new());
    let router = Router::new()
        .route("/api/users/refresh", get(refresh_handler))
        .route("/api/data", get(data_handler))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock api");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock api");
    });

    let store_dir = tempfile::tempdir().expect("tempdir");
    let store =
        CredentialStore::open(store_dir.path().join("credentials.db")).expect("open store");

    let redirects = Arc::new(AtomicUsize::new(0));
    let client = ApiClient::builder(
        ClientConfig::new(format!("http://{addr}"), Duration::from_secs(10)),
        store.clone(),
    )
    .navigator(RecordingNavigator {
        redirects: redirects.clone(),
    })
    .build()
    .expect("build client");

    TestHarness {
        client,
        store,
        api,
        redirects,
        _store_dir: store_dir,
    }
}

async fn refresh_handler(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.fail_refresh.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "refresh unavailable"})),
        )
            .into_response();
    }

    let expected = state.valid_refresh.lock().unwrap().clone();
    if bearer_token(&headers).as_deref() != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid refresh token"})),
        )
            .into_response();
    }

    *state.valid_access.lock().unwrap() = state.next_access.clone();
    *state.valid_refresh.lock().unwrap() = state.next_refresh.clone();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "acessToken": state.next_access,
            "refreshToken": state.next_refresh,
            "result": {"id": 1},
        })),
    )
        .into_response()
}

async fn data_handler(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    state.data_calls.fetch_add(1, Ordering::SeqCst);

    let presented = bearer_token(&headers);
    state.data_auth_seen.lock().unwrap().push(presented.clone());

    if state.always_unauthorized.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    if !state.require_auth.load(Ordering::SeqCst) {
        return (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response();
    }

    let valid = state.valid_access.lock().unwrap().clone();
    if presented.as_deref() == Some(valid.as_str()) {
        (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
