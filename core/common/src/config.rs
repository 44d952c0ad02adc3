//! Static provider credentials.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result, SensitiveString};

/// Environment variable holding the OAuth client id.
pub const ENV_CLIENT_ID: &str = "REPORTSYNC_GOOGLE_CLIENT_ID";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "REPORTSYNC_GOOGLE_API_KEY";
/// Environment variable holding the destination folder id.
pub const ENV_FOLDER_ID: &str = "REPORTSYNC_GOOGLE_FOLDER_ID";
/// Environment variable holding the installed-app client secret.
pub const ENV_CLIENT_SECRET: &str = "REPORTSYNC_GOOGLE_CLIENT_SECRET";

/// Credentials as they appear on disk or in the environment.
#[derive(Debug, Default, Deserialize)]
struct RawCredentials {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default, alias = "folder_id")]
    container_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

/// Application id, API key and destination container.
///
/// Validated once at construction and never mutated afterwards.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    api_key: SensitiveString,
    container_id: Option<String>,
    client_secret: Option<SensitiveString>,
}

impl Credentials {
    /// Build credentials, failing on a missing client id or API key.
    ///
    /// A blank container id is allowed: creates are then left unparented.
    pub fn new(
        client_id: impl Into<String>,
        api_key: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Result<Self> {
        Self::from_raw(RawCredentials {
            client_id: Some(client_id.into()),
            api_key: Some(api_key.into()),
            container_id: Some(container_id.into()),
            client_secret: None,
        })
    }

    /// Attach the installed-app client secret used when redeeming a code.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.client_secret = non_blank(Some(secret)).map(SensitiveString::new);
        self
    }

    /// Read credentials from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_raw(RawCredentials {
            client_id: std::env::var(ENV_CLIENT_ID).ok(),
            api_key: std::env::var(ENV_API_KEY).ok(),
            container_id: std::env::var(ENV_FOLDER_ID).ok(),
            client_secret: std::env::var(ENV_CLIENT_SECRET).ok(),
        })
    }

    /// Read credentials from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse credentials from JSON content.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawCredentials = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid credentials file: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Load from an explicit file, the per-user config file, or the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = Self::default_path().filter(|p| p.is_file()) {
            tracing::debug!(path = %path.display(), "Loading credentials file");
            return Self::from_file(path);
        }

        Self::from_env()
    }

    /// Per-user credentials file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reportsync").join("credentials.json"))
    }

    fn from_raw(raw: RawCredentials) -> Result<Self> {
        let client_id = non_blank(raw.client_id);
        let api_key = non_blank(raw.api_key);

        let mut missing = Vec::new();
        if client_id.is_none() {
            missing.push("client_id");
        }
        if api_key.is_none() {
            missing.push("api_key");
        }

        match (client_id, api_key) {
            (Some(client_id), Some(api_key)) => Ok(Self {
                client_id,
                api_key: SensitiveString::new(api_key),
                container_id: non_blank(raw.container_id),
                client_secret: non_blank(raw.client_secret).map(SensitiveString::new),
            }),
            _ => Err(Error::Configuration(format!(
                "Missing Google API credentials: {}",
                missing.join(", ")
            ))),
        }
    }

    /// OAuth client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// API key used for discovery and unauthenticated calls.
    pub fn api_key(&self) -> &SensitiveString {
        &self.api_key
    }

    /// Destination folder id, if configured.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Installed-app client secret, if configured.
    pub fn client_secret(&self) -> Option<&SensitiveString> {
        self.client_secret.as_ref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"[REDACTED]")
            .field("container_id", &self.container_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_fields_are_named() {
        let err = Credentials::new("", " ", "folder").unwrap_err();
        match err {
            Error::Configuration(message) => {
                assert!(message.contains("client_id"));
                assert!(message.contains("api_key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blank_container_is_optional() {
        let creds = Credentials::new("client.apps.googleusercontent.com", "key", "").unwrap();
        assert_eq!(creds.container_id(), None);
        assert_eq!(creds.client_id(), "client.apps.googleusercontent.com");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("client", "AIzaSecret", "folder")
            .unwrap()
            .with_client_secret("GOCSPX-secret");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("AIzaSecret"));
        assert!(!debug.contains("GOCSPX"));
        assert!(debug.contains("folder"));
    }

    #[test]
    fn test_from_file_accepts_folder_alias() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"client_id": "cid", "api_key": "key", "folder_id": "f123"}}"#
        )
        .unwrap();

        let creds = Credentials::from_file(file.path()).unwrap();
        assert_eq!(creds.container_id(), Some("f123"));
        assert!(creds.client_secret().is_none());
    }

    #[test]
    fn test_from_file_missing_api_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"client_id": "cid"}}"#).unwrap();

        assert!(matches!(
            Credentials::from_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }
}
