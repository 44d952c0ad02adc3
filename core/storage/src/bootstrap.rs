//! One-time provider client bootstrap.
//!
//! The bootstrapper loads the provider runtime (discovery documents), waits a
//! bounded time for the client capability to attach, initializes it with the
//! API key, and prepares the OAuth token request. Concurrent callers share the
//! same attempt; a failed attempt is terminal until [`ClientBootstrapper::reset`].

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use reportsync_common::{await_ready, Credentials, Error, Result, RetryExecutor, SensitiveString};

/// Drive v3 discovery document.
pub const DRIVE_DISCOVERY_DOC: &str = "https://www.googleapis.com/discovery/v1/apis/drive/v3/rest";
/// Sheets v4 discovery document.
pub const SHEETS_DISCOVERY_DOC: &str = "https://sheets.googleapis.com/$discovery/rest?version=v4";
/// Documents every runtime is initialized with.
pub const DISCOVERY_DOCS: [&str; 2] = [DRIVE_DISCOVERY_DOC, SHEETS_DISCOVERY_DOC];

/// Per-file access to files the app creates or opens.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
/// Read/write access to spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Lifecycle of the provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessState {
    /// Nothing loaded yet.
    Uninitialized,
    /// An attempt is in flight.
    Initializing,
    /// Runtime loaded and client configured.
    Ready,
    /// Last attempt failed; terminal until reset.
    Failed,
}

/// Base URLs of the REST surfaces the services talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    /// Drive metadata API, e.g. `https://www.googleapis.com/drive/v3`.
    pub drive_base: String,
    /// Drive media upload API.
    pub upload_base: String,
    /// Sheets API, e.g. `https://sheets.googleapis.com/v4`.
    pub sheets_base: String,
}

impl ApiEndpoints {
    /// Public Google endpoints.
    pub fn google() -> Self {
        Self {
            drive_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            sheets_base: "https://sheets.googleapis.com/v4".to_string(),
        }
    }

    /// All surfaces served from one root (emulators, mock servers).
    pub fn with_root(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            drive_base: format!("{}/drive/v3", root),
            upload_base: format!("{}/upload/drive/v3", root),
            sheets_base: format!("{}/v4", root),
        }
    }
}

/// OAuth token request parameters bound at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// OAuth client id.
    pub client_id: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// Everything a network call needs once bootstrap succeeded.
#[derive(Debug)]
pub struct ProviderRuntime {
    /// Shared HTTP client.
    pub http: reqwest::Client,
    /// REST base URLs.
    pub endpoints: ApiEndpoints,
    /// Token request handed to the consent flow.
    pub token_request: TokenRequest,
    /// API key appended to provider calls.
    pub api_key: SensitiveString,
}

/// Loads and initializes the provider's client runtime.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    /// Start loading the base runtime.
    async fn load_base(&self) -> Result<()>;

    /// Whether the client capability has attached. Polled with a bounded wait.
    async fn client_attached(&self) -> bool;

    /// Initialize the client and report where its APIs live.
    async fn init_client(
        &self,
        api_key: &SensitiveString,
        discovery_docs: &[&str],
    ) -> Result<ApiEndpoints>;
}

/// Bootstrap timing.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Delay between attachment checks.
    pub poll_interval: Duration,
    /// Attachment checks before giving up.
    pub max_attempts: u32,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_attempts: 40,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared outcome of one bootstrap attempt.
#[derive(Debug, Clone)]
struct BootstrapFailure {
    message: String,
    elapsed: Duration,
}

type Attempt = Arc<OnceCell<std::result::Result<Arc<ProviderRuntime>, BootstrapFailure>>>;

/// Ensures the provider client is loaded and initialized exactly once.
pub struct ClientBootstrapper {
    credentials: Credentials,
    loader: Arc<dyn RuntimeLoader>,
    config: BootstrapConfig,
    state: RwLock<ReadinessState>,
    attempt: RwLock<Attempt>,
}

impl ClientBootstrapper {
    /// Create a bootstrapper with default timing.
    pub fn new(credentials: Credentials, loader: Arc<dyn RuntimeLoader>) -> Self {
        Self::with_config(credentials, loader, BootstrapConfig::default())
    }

    /// Create a bootstrapper with custom timing.
    pub fn with_config(
        credentials: Credentials,
        loader: Arc<dyn RuntimeLoader>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            credentials,
            loader,
            config,
            state: RwLock::new(ReadinessState::Uninitialized),
            attempt: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Current readiness.
    pub fn state(&self) -> ReadinessState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Credentials the runtime is bound to.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Load and initialize the client, or await the attempt already running.
    pub async fn initialize(&self) -> Result<()> {
        self.runtime().await.map(|_| ())
    }

    /// The initialized runtime, bootstrapping first if needed.
    pub async fn runtime(&self) -> Result<Arc<ProviderRuntime>> {
        let attempt = self
            .attempt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let outcome = attempt.get_or_init(|| self.bootstrap()).await;

        match outcome {
            Ok(runtime) => Ok(runtime.clone()),
            Err(failure) => Err(Error::Initialization {
                message: failure.message.clone(),
                elapsed: failure.elapsed,
            }),
        }
    }

    /// Return a failed bootstrapper to `Uninitialized` so the next call retries.
    ///
    /// Returns `false` (and does nothing) unless the state is `Failed`.
    pub fn reset(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != ReadinessState::Failed {
            return false;
        }

        *self.attempt.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(OnceCell::new());
        *state = ReadinessState::Uninitialized;
        info!("Client bootstrap reset after failure");
        true
    }

    fn set_state(&self, next: ReadinessState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        debug!(from = ?*state, to = ?next, "Readiness transition");
        *state = next;
    }

    async fn bootstrap(&self) -> std::result::Result<Arc<ProviderRuntime>, BootstrapFailure> {
        self.set_state(ReadinessState::Initializing);
        let started = Instant::now();
        info!("Initializing provider client");

        match self.run_steps().await {
            Ok(runtime) => {
                self.set_state(ReadinessState::Ready);
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Provider client ready"
                );
                Ok(Arc::new(runtime))
            }
            Err(err) => {
                self.set_state(ReadinessState::Failed);
                let failure = BootstrapFailure {
                    message: match err {
                        Error::Initialization { message, .. } => message,
                        other => other.to_string(),
                    },
                    elapsed: started.elapsed(),
                };
                error!(
                    elapsed_ms = failure.elapsed.as_millis() as u64,
                    "Provider client initialization failed: {}", failure.message
                );
                Err(failure)
            }
        }
    }

    async fn run_steps(&self) -> Result<ProviderRuntime> {
        self.loader.load_base().await?;

        let loader = self.loader.clone();
        await_ready(
            "provider client",
            move || {
                let loader = loader.clone();
                async move { loader.client_attached().await }
            },
            self.config.poll_interval,
            self.config.max_attempts,
        )
        .await?;

        let endpoints = self
            .loader
            .init_client(self.credentials.api_key(), &DISCOVERY_DOCS)
            .await?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("reportsync/", env!("CARGO_PKG_VERSION")))
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let token_request = TokenRequest {
            client_id: self.credentials.client_id().to_string(),
            scopes: vec![DRIVE_FILE_SCOPE.to_string(), SPREADSHEETS_SCOPE.to_string()],
        };

        Ok(ProviderRuntime {
            http,
            endpoints,
            token_request,
            api_key: self.credentials.api_key().clone(),
        })
    }
}

/// Loader with fixed endpoints, for emulated backends and tests.
///
/// Counts how often the base runtime was loaded and can be told to attach
/// late or never.
pub struct StaticRuntime {
    endpoints: ApiEndpoints,
    attach_after: u32,
    polls: AtomicU32,
    loads: AtomicU32,
    load_delay: Duration,
}

impl StaticRuntime {
    /// Runtime that attaches immediately.
    pub fn new(endpoints: ApiEndpoints) -> Self {
        Self {
            endpoints,
            attach_after: 0,
            polls: AtomicU32::new(0),
            loads: AtomicU32::new(0),
            load_delay: Duration::ZERO,
        }
    }

    /// Attach only after `polls` unsuccessful checks; `u32::MAX` never attaches.
    pub fn attach_after(mut self, polls: u32) -> Self {
        self.attach_after = polls;
        self
    }

    /// Sleep this long while loading the base runtime.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// How many times the base runtime was loaded.
    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeLoader for StaticRuntime {
    async fn load_base(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(())
    }

    async fn client_attached(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) >= self.attach_after
    }

    async fn init_client(
        &self,
        _api_key: &SensitiveString,
        _discovery_docs: &[&str],
    ) -> Result<ApiEndpoints> {
        Ok(self.endpoints.clone())
    }
}

/// Subset of a discovery document used to locate an API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryDocument {
    name: String,
    version: String,
    root_url: String,
    #[serde(default)]
    service_path: String,
}

impl DiscoveryDocument {
    fn base_url(&self) -> String {
        let root = self.root_url.trim_end_matches('/');
        let service = self.service_path.trim_matches('/');
        if service.is_empty() {
            format!("{}/{}", root, self.version)
        } else {
            format!("{}/{}", root, service)
        }
    }
}

type Fetched = Vec<(String, DiscoveryDocument)>;

/// Loader that fetches the provider's discovery documents.
///
/// `load_base` starts the download in the background; the client counts as
/// attached once the download has finished.
pub struct DiscoveryRuntime {
    http: reqwest::Client,
    documents: Vec<String>,
    task: Mutex<Option<JoinHandle<Result<Fetched>>>>,
    fetched: tokio::sync::Mutex<Option<Result<Fetched>>>,
}

impl DiscoveryRuntime {
    /// Loader for the default Drive and Sheets documents.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_documents(http, &DISCOVERY_DOCS))
    }

    /// Loader for an explicit document list.
    pub fn with_documents(http: reqwest::Client, documents: &[&str]) -> Self {
        Self {
            http,
            documents: documents.iter().map(|d| d.to_string()).collect(),
            task: Mutex::new(None),
            fetched: tokio::sync::Mutex::new(None),
        }
    }

    async fn fetch_all(http: reqwest::Client, documents: Vec<String>) -> Result<Fetched> {
        let executor = RetryExecutor::default();
        let mut fetched = Vec::with_capacity(documents.len());

        for url in documents {
            let doc = executor
                .execute(|| Self::fetch_one(&http, &url, None))
                .await?;
            debug!(api = %doc.name, version = %doc.version, "Discovery document loaded");
            fetched.push((url, doc));
        }

        Ok(fetched)
    }

    async fn fetch_one(
        http: &reqwest::Client,
        url: &str,
        api_key: Option<&SensitiveString>,
    ) -> Result<DiscoveryDocument> {
        let mut request = http.get(url);
        if let Some(key) = api_key {
            request = request.query(&[("key", key.expose())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch discovery document: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload {
                operation: "discovery".to_string(),
                target: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid discovery document {}: {}", url, e)))
    }

    /// Collect the background download once it has finished.
    async fn take_fetched(&self) -> Result<Fetched> {
        let mut fetched = self.fetched.lock().await;

        if fetched.is_none() {
            let handle = self
                .task
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
                .ok_or_else(|| Error::InvalidInput("Base runtime was never loaded".to_string()))?;

            let result = handle
                .await
                .map_err(|e| Error::Network(format!("Discovery task failed: {}", e)))?;
            *fetched = Some(result);
        }

        match fetched.as_ref() {
            Some(Ok(docs)) => Ok(docs.clone()),
            Some(Err(e)) => Err(Error::Network(e.to_string())),
            None => Err(Error::InvalidInput("Discovery documents unavailable".to_string())),
        }
    }
}

#[async_trait]
impl RuntimeLoader for DiscoveryRuntime {
    async fn load_base(&self) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_none() {
            let http = self.http.clone();
            let documents = self.documents.clone();
            *task = Some(tokio::spawn(Self::fetch_all(http, documents)));
        }
        Ok(())
    }

    async fn client_attached(&self) -> bool {
        if self.fetched.lock().await.is_some() {
            return true;
        }
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
    }

    async fn init_client(
        &self,
        api_key: &SensitiveString,
        discovery_docs: &[&str],
    ) -> Result<ApiEndpoints> {
        if api_key.is_empty() {
            return Err(Error::Configuration("API key is empty".to_string()));
        }

        let prefetched = self.take_fetched().await?;
        let mut endpoints = ApiEndpoints::google();

        for url in discovery_docs {
            let doc = match prefetched.iter().find(|(u, _)| u == url) {
                Some((_, doc)) => doc.clone(),
                None => Self::fetch_one(&self.http, url, Some(api_key)).await?,
            };

            match doc.name.as_str() {
                "drive" => {
                    endpoints.drive_base = doc.base_url();
                    endpoints.upload_base = format!(
                        "{}/upload/{}",
                        doc.root_url.trim_end_matches('/'),
                        doc.service_path.trim_matches('/')
                    );
                }
                "sheets" => endpoints.sheets_base = doc.base_url(),
                other => debug!(api = other, "Ignoring discovery document"),
            }
        }

        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("client-id", "api-key", "folder").unwrap()
    }

    fn fast_config() -> BootstrapConfig {
        BootstrapConfig {
            poll_interval: Duration::from_millis(1),
            max_attempts: 3,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_initialize_transitions_to_ready() {
        let loader = Arc::new(StaticRuntime::new(ApiEndpoints::google()));
        let bootstrapper = ClientBootstrapper::with_config(credentials(), loader, fast_config());

        assert_eq!(bootstrapper.state(), ReadinessState::Uninitialized);
        bootstrapper.initialize().await.unwrap();
        assert_eq!(bootstrapper.state(), ReadinessState::Ready);

        let runtime = bootstrapper.runtime().await.unwrap();
        assert_eq!(runtime.token_request.client_id, "client-id");
        assert!(runtime
            .token_request
            .scopes
            .contains(&DRIVE_FILE_SCOPE.to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_initialize_loads_once() {
        let loader = Arc::new(
            StaticRuntime::new(ApiEndpoints::google()).with_load_delay(Duration::from_millis(20)),
        );
        let bootstrapper = Arc::new(ClientBootstrapper::with_config(
            credentials(),
            loader.clone(),
            fast_config(),
        ));

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let b = bootstrapper.clone();
                tokio::spawn(async move { b.initialize().await })
            })
            .collect();

        for call in futures::future::join_all(calls).await {
            assert!(call.unwrap().is_ok());
        }
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_attach_timeout_is_terminal() {
        let loader = Arc::new(StaticRuntime::new(ApiEndpoints::google()).attach_after(u32::MAX));
        let bootstrapper =
            ClientBootstrapper::with_config(credentials(), loader.clone(), fast_config());

        let first = bootstrapper.initialize().await;
        assert!(matches!(first, Err(Error::Initialization { .. })));
        assert_eq!(bootstrapper.state(), ReadinessState::Failed);

        // No implicit retry.
        let second = bootstrapper.initialize().await;
        assert!(matches!(second, Err(Error::Initialization { .. })));
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_shares_one_failure() {
        let loader = Arc::new(
            StaticRuntime::new(ApiEndpoints::google())
                .attach_after(u32::MAX)
                .with_load_delay(Duration::from_millis(20)),
        );
        let bootstrapper = Arc::new(ClientBootstrapper::with_config(
            credentials(),
            loader.clone(),
            fast_config(),
        ));

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let b = bootstrapper.clone();
                tokio::spawn(async move { b.initialize().await })
            })
            .collect();

        for call in futures::future::join_all(calls).await {
            assert!(matches!(call.unwrap(), Err(Error::Initialization { .. })));
        }
        assert_eq!(loader.load_count(), 1);
        assert_eq!(bootstrapper.state(), ReadinessState::Failed);
    }

    #[tokio::test]
    async fn test_reset_allows_new_attempt() {
        let loader = Arc::new(StaticRuntime::new(ApiEndpoints::google()).attach_after(3));
        let bootstrapper =
            ClientBootstrapper::with_config(credentials(), loader.clone(), fast_config());

        assert!(bootstrapper.initialize().await.is_err());
        assert!(bootstrapper.reset());
        assert_eq!(bootstrapper.state(), ReadinessState::Uninitialized);

        // Poll counter keeps running, so the second attempt attaches.
        bootstrapper.initialize().await.unwrap();
        assert_eq!(bootstrapper.state(), ReadinessState::Ready);
        assert_eq!(loader.load_count(), 2);
        assert!(!bootstrapper.reset());
    }

    #[test]
    fn test_discovery_base_urls() {
        let drive: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "name": "drive",
            "version": "v3",
            "rootUrl": "https://www.googleapis.com/",
            "servicePath": "drive/v3/"
        }))
        .unwrap();
        let sheets: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "name": "sheets",
            "version": "v4",
            "rootUrl": "https://sheets.googleapis.com/",
            "servicePath": ""
        }))
        .unwrap();

        assert_eq!(drive.base_url(), ApiEndpoints::google().drive_base);
        assert_eq!(sheets.base_url(), ApiEndpoints::google().sheets_base);
    }

    #[test]
    fn test_endpoints_with_root() {
        let endpoints = ApiEndpoints::with_root("http://127.0.0.1:9000/");
        assert_eq!(endpoints.drive_base, "http://127.0.0.1:9000/drive/v3");
        assert_eq!(endpoints.upload_base, "http://127.0.0.1:9000/upload/drive/v3");
        assert_eq!(endpoints.sheets_base, "http://127.0.0.1:9000/v4");
    }
}
