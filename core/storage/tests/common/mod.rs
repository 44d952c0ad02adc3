// Shared fixtures for the wiremock integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{MockServer, Request};

use reportsync_common::{Credentials, Error, Result, SensitiveString};
use reportsync_storage::{
    ApiEndpoints, BootstrapConfig, ConsentFlow, GoogleWorkspace, GrantedToken, StaticRuntime,
    TokenRequest,
};

pub const FOLDER_ID: &str = "folder-1";

/// Consent that grants `token-1`, `token-2`, ... and counts prompts.
#[derive(Default)]
pub struct CountingConsent {
    prompts: AtomicU32,
}

impl CountingConsent {
    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsentFlow for CountingConsent {
    async fn request_token(&self, _request: &TokenRequest) -> Result<GrantedToken> {
        let n = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GrantedToken {
            access_token: SensitiveString::new(format!("token-{n}")),
            expires_in: None,
        })
    }

    async fn revoke(&self, _access_token: &str) -> Result<()> {
        Err(Error::Network("revocation is not mocked".to_string()))
    }
}

pub struct Harness {
    pub server: MockServer,
    pub workspace: GoogleWorkspace,
    pub consent: Arc<CountingConsent>,
}

pub async fn setup() -> Harness {
    setup_with_container(FOLDER_ID).await
}

pub async fn setup_with_container(container: &str) -> Harness {
    let server = MockServer::start().await;
    let credentials = Credentials::new("client-id", "api-key", container).unwrap();
    let loader = Arc::new(StaticRuntime::new(ApiEndpoints::with_root(&server.uri())));
    let consent = Arc::new(CountingConsent::default());
    let config = BootstrapConfig {
        poll_interval: Duration::from_millis(1),
        max_attempts: 3,
        request_timeout: Duration::from_secs(5),
    };

    let workspace = GoogleWorkspace::with_config(credentials, loader, consent.clone(), config);
    Harness {
        server,
        workspace,
        consent,
    }
}

/// `METHOD path` of every request the server saw, in arrival order.
pub async fn request_log(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}

pub fn bearer(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
