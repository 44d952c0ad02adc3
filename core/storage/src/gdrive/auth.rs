//! OAuth2 consent and session management for Google Drive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use reportsync_common::{Error, Result, SensitiveString};

use crate::bootstrap::{ClientBootstrapper, TokenRequest};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// OAuth2 revocation endpoint.
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Path the loopback listener expects the redirect on.
const CALLBACK_PATH: &str = "/callback";

/// Token delivered by a completed consent flow.
#[derive(Debug, Clone)]
pub struct GrantedToken {
    /// Bearer token for API requests.
    pub access_token: SensitiveString,
    /// Lifetime reported by the provider, informational only.
    pub expires_in: Option<Duration>,
}

/// Interactive, user-driven token acquisition.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Run the consent flow until the provider delivers a token or an error.
    async fn request_token(&self, request: &TokenRequest) -> Result<GrantedToken>;

    /// Revoke a token with the provider.
    async fn revoke(&self, access_token: &str) -> Result<()>;
}

/// Access token held for the process.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: SensitiveString,
    obtained_at: DateTime<Utc>,
}

impl Session {
    fn new(access_token: SensitiveString) -> Self {
        Self {
            access_token,
            obtained_at: Utc::now(),
        }
    }

    /// The bearer token.
    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    /// When consent delivered the token.
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }
}

type PendingConsent = Shared<BoxFuture<'static, std::result::Result<Session, String>>>;

/// Holds the session and serializes consent so only one prompt is ever open.
///
/// Expiry is not tracked: callers hand back tokens the provider rejected via
/// [`AuthSession::invalidate`] and ask again.
pub struct AuthSession {
    bootstrapper: Arc<ClientBootstrapper>,
    consent: Arc<dyn ConsentFlow>,
    session: Arc<RwLock<Option<Session>>>,
    pending: Arc<Mutex<Option<PendingConsent>>>,
}

impl AuthSession {
    /// Create a signed-out session.
    pub fn new(bootstrapper: Arc<ClientBootstrapper>, consent: Arc<dyn ConsentFlow>) -> Self {
        Self {
            bootstrapper,
            consent,
            session: Arc::new(RwLock::new(None)),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the held token, or run (or join) the consent flow for a new one.
    pub async fn ensure_token(&self) -> Result<String> {
        let runtime = self.bootstrapper.runtime().await?;

        if let Some(token) = self.current_token().await {
            return Ok(token);
        }

        let pending = {
            let mut slot = self.pending.lock().await;

            // A flow may have completed while we waited for the slot.
            if let Some(token) = self.current_token().await {
                return Ok(token);
            }

            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining consent flow already in progress");
                    pending.clone()
                }
                None => {
                    let flow = Self::run_consent(
                        self.consent.clone(),
                        runtime.token_request.clone(),
                        self.session.clone(),
                        self.pending.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(flow.clone());
                    flow
                }
            }
        };

        pending
            .await
            .map(|session| session.access_token().to_string())
            .map_err(Error::Authentication)
    }

    async fn run_consent(
        consent: Arc<dyn ConsentFlow>,
        request: TokenRequest,
        session: Arc<RwLock<Option<Session>>>,
        pending: Arc<Mutex<Option<PendingConsent>>>,
    ) -> std::result::Result<Session, String> {
        info!("Starting interactive consent flow");

        let outcome = match consent.request_token(&request).await {
            Ok(granted) => {
                let fresh = Session::new(granted.access_token);
                *session.write().await = Some(fresh.clone());
                info!(expires_in = ?granted.expires_in, "Consent granted");
                Ok(fresh)
            }
            Err(err) => {
                warn!("Consent flow failed: {}", err);
                Err(match err {
                    Error::Authentication(message) => message,
                    other => other.to_string(),
                })
            }
        };

        *pending.lock().await = None;
        outcome
    }

    /// Currently held token, if any.
    pub async fn current_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token().to_string())
    }

    /// Snapshot of the session, if signed in.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Check whether a token is held.
    pub async fn is_signed_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Drop the session if it still holds `rejected`.
    pub async fn invalidate(&self, rejected: &str) {
        let mut session = self.session.write().await;
        if session
            .as_ref()
            .is_some_and(|s| s.access_token() == rejected)
        {
            warn!("Provider rejected the held token, clearing session");
            *session = None;
        }
    }

    /// Revoke the held token and clear the session. No-op when signed out.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            debug!("sign_out called without a session");
            return Ok(());
        };

        if let Err(err) = self.consent.revoke(session.access_token()).await {
            warn!("Token revocation failed, session cleared locally: {}", err);
        } else {
            info!("Signed out");
        }
        Ok(())
    }
}

/// Query parameters delivered to the loopback redirect.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Desktop consent: authorization code + PKCE with a loopback redirect.
pub struct LoopbackConsent {
    http: reqwest::Client,
    client_secret: Option<SensitiveString>,
    timeout: Duration,
}

impl LoopbackConsent {
    /// Create a consent flow that waits up to five minutes for the user.
    pub fn new(client_secret: Option<SensitiveString>) -> Result<Self> {
        // The token exchange must not follow redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            client_secret,
            timeout: Duration::from_secs(300),
        })
    }

    /// Change how long to wait for the browser redirect.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn receive_callback(listener: &TcpListener) -> Result<CallbackParams> {
        loop {
            let (mut stream, _) = listener.accept().await?;
            let Some(target) = read_request_target(&mut stream).await? else {
                continue;
            };

            match parse_callback(&target) {
                Some(params) => {
                    let page = if params.error.is_some() {
                        "Authorization was not granted. You can close this window."
                    } else {
                        "Authorization complete. You can close this window."
                    };
                    respond(&mut stream, "200 OK", page).await;
                    return Ok(params);
                }
                None => respond(&mut stream, "404 Not Found", "Not found").await,
            }
        }
    }
}

#[async_trait]
impl ConsentFlow for LoopbackConsent {
    async fn request_token(&self, request: &TokenRequest) -> Result<GrantedToken> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        let mut client = BasicClient::new(ClientId::new(request.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH))
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.expose().to_string()));
        }

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let mut authorize = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(challenge)
            .add_extra_param("prompt", "consent");
        for scope in &request.scopes {
            authorize = authorize.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, csrf) = authorize.url();

        info!(url = %auth_url, "Opening browser for Google consent");
        open::that(auth_url.as_str())
            .map_err(|e| Error::Authentication(format!("Could not open browser: {}", e)))?;

        let params = tokio::time::timeout(self.timeout, Self::receive_callback(&listener))
            .await
            .map_err(|_| {
                Error::Authentication(format!(
                    "No consent received within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        if let Some(error) = params.error {
            return Err(Error::Authentication(format!("Consent declined: {}", error)));
        }
        if params.state.as_deref() != Some(csrf.secret().as_str()) {
            return Err(Error::Authentication(
                "Consent callback state mismatch".to_string(),
            ));
        }
        let code = params.code.ok_or_else(|| {
            Error::Authentication("Consent callback carried no authorization code".to_string())
        })?;

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        Ok(GrantedToken {
            access_token: SensitiveString::new(token.access_token().secret().clone()),
            expires_in: token.expires_in(),
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<()> {
        let response = self
            .http
            .post(GOOGLE_REVOKE_URL)
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to revoke token: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Authentication(format!(
                "Revocation rejected: {} - {}",
                status, body
            )))
        }
    }
}

/// Read the request line and return its target (path + query).
async fn read_request_target(stream: &mut TcpStream) -> Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < 8192 {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string);
    Ok(target)
}

fn parse_callback(target: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(params)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer loopback request: {}", e);
    }
}
