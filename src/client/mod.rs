//! Usage: Instrumented API client (bearer attach on send, coordinated refresh on 401).

use crate::auth::navigation::{LoginNavigator, NoopNavigator};
use crate::auth::refresh::{clear_credentials_best_effort, refresh_credentials};
use crate::config::ClientConfig;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::store::CredentialStore;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// One request through the instrumented client. Rebuilt from these parts on
/// every attempt, so a retry carries fresh credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: normalize_path(&path.into()),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Default)]
struct RefreshGate {
    is_refreshing: bool,
    waiters: Vec<oneshot::Sender<AppResult<String>>>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    store: CredentialStore,
    navigator: Box<dyn LoginNavigator>,
    refresh_gate: Mutex<RefreshGate>,
}

/// Cheap-to-clone handle; all clones share the store and the refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    store: CredentialStore,
    navigator: Box<dyn LoginNavigator>,
}

impl ApiClientBuilder {
    pub fn navigator(mut self, navigator: impl LoginNavigator + 'static) -> Self {
        self.navigator = Box::new(navigator);
        self
    }

    pub fn build(self) -> AppResult<ApiClient> {
        let http = reqwest::Client::builder()
            .user_agent(format!("bearer-guard/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| format!("HTTP_CLIENT_INIT: {e}"))?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                config: self.config,
                store: self.store,
                navigator: self.navigator,
                refresh_gate: Mutex::new(RefreshGate::default()),
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig, store: CredentialStore) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store,
            navigator: Box::new(NoopNavigator),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub async fn get(&self, path: &str) -> AppResult<reqwest::Response> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> AppResult<reqwest::Response> {
        let body = serde_json::to_value(body)
            .map_err(|e| format!("HTTP_REQUEST_FAILED: failed to serialize request body: {e}"))?;
        self.execute(ApiRequest::post(path).json(body)).await
    }

    /// Send a request with the stored access token attached. A 401 triggers one
    /// coordinated refresh and one retry; any further 401 passes through.
    pub async fn execute(&self, request: ApiRequest) -> AppResult<reqwest::Response> {
        let mut token_override: Option<String> = None;
        let mut retried = false;

        loop {
            let response = self.send_once(&request, token_override.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED || retried {
                return Ok(response);
            }

            retried = true;
            token_override = Some(self.refresh_or_wait().await?);
        }
    }

    /// The refresh protocol as a direct call (proactive refresh). Does not
    /// consult the 401 gate.
    pub async fn refresh_access_token(&self) -> AppResult<String> {
        refresh_credentials(
            &self.inner.http,
            &self.inner.config,
            &self.inner.store,
            self.inner.navigator.as_ref(),
        )
        .await
    }

    /// Wipe stored credentials and redirect to login. Never touches the network.
    pub fn logout(&self) {
        clear_credentials_best_effort(&self.inner.store);
        self.inner.navigator.redirect_to_login();
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token_override: Option<&str>,
    ) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.inner.config.base_url, request.path);
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .headers(request.headers.clone());

        let token = match token_override {
            Some(token) => Some(token.to_string()),
            None => self.read_access_token_fail_open(),
        };
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| format!("HTTP_REQUEST_FAILED: request failed: {e}").into())
    }

    /// Storage failures never block an outbound request; it just goes out
    /// without credentials.
    fn read_access_token_fail_open(&self) -> Option<String> {
        match self.inner.store.access_token() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(
                    "access token read failed; sending request without credentials: {}",
                    err
                );
                None
            }
        }
    }

    /// Single-flight refresh. The first 401 becomes the leader and runs the
    /// protocol; concurrent 401s park on a oneshot until the leader broadcasts
    /// the outcome. Waiters are only released after the refresh settles.
    async fn refresh_or_wait(&self) -> AppResult<String> {
        let waiter = {
            let mut gate = self.inner.refresh_gate.lock_or_recover();
            if gate.is_refreshing {
                let (tx, rx) = oneshot::channel();
                gate.waiters.push(tx);
                Some(rx)
            } else {
                gate.is_refreshing = true;
                None
            }
        };

        match waiter {
            Some(rx) => rx.await.map_err(|_| {
                "AUTH_REFRESH_FAILED: refresh leader dropped before completing".to_string()
            })?,
            None => {
                let outcome = self.refresh_access_token().await;
                let waiters = {
                    let mut gate = self.inner.refresh_gate.lock_or_recover();
                    gate.is_refreshing = false;
                    std::mem::take(&mut gate.waiters)
                };
                if !waiters.is_empty() {
                    tracing::debug!(waiters = waiters.len(), "releasing queued requests");
                }
                for tx in waiters {
                    let _ = tx.send(outcome.clone());
                }
                outcome
            }
        }
    }
}
