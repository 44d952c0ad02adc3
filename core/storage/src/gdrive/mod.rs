//! Google Drive and Sheets services.
//!
//! This module provides the authenticated provider surface:
//! - OAuth2 consent with a single in-flight prompt and a loopback redirect
//! - A REST client that re-authenticates once on 401
//! - Name resolution, file upserts and multi-sheet spreadsheet sync

pub mod auth;
pub mod client;
pub mod resolver;
pub mod spreadsheet;
pub mod upsert;

pub use auth::{AuthSession, ConsentFlow, GrantedToken, LoopbackConsent, Session};
pub use client::{file_view_url, spreadsheet_edit_url, DriveClient, RemoteObjectRef};
pub use resolver::{
    build_file_query, build_query, escape_query_value, RemoteFileResolver, NATIVE_MIME_PREFIX,
};
pub use spreadsheet::{SpreadsheetSyncService, SPREADSHEET_MIME};
pub use upsert::{FileUpsertService, DEFAULT_CONTENT_TYPE};

use std::sync::Arc;

use reportsync_common::{Credentials, Result};

use crate::bootstrap::{BootstrapConfig, ClientBootstrapper, DiscoveryRuntime, RuntimeLoader};

/// The wired service graph for one set of credentials.
///
/// Bootstrapper and session are shared by every service, so a token obtained
/// for an upload is reused by the spreadsheet sync and vice versa.
pub struct GoogleWorkspace {
    bootstrapper: Arc<ClientBootstrapper>,
    auth: Arc<AuthSession>,
    resolver: Arc<RemoteFileResolver>,
    files: FileUpsertService,
    spreadsheets: SpreadsheetSyncService,
}

impl GoogleWorkspace {
    /// Wire services over a runtime loader and consent flow.
    pub fn new(
        credentials: Credentials,
        loader: Arc<dyn RuntimeLoader>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self::with_config(credentials, loader, consent, BootstrapConfig::default())
    }

    /// Wire services with custom bootstrap timing.
    pub fn with_config(
        credentials: Credentials,
        loader: Arc<dyn RuntimeLoader>,
        consent: Arc<dyn ConsentFlow>,
        config: BootstrapConfig,
    ) -> Self {
        let container_id = credentials.container_id().map(str::to_string);

        let bootstrapper = Arc::new(ClientBootstrapper::with_config(credentials, loader, config));
        let auth = Arc::new(AuthSession::new(bootstrapper.clone(), consent));
        let client = Arc::new(DriveClient::new(bootstrapper.clone(), auth.clone()));
        let resolver = Arc::new(RemoteFileResolver::new(
            client.clone(),
            container_id.clone(),
        ));

        Self {
            files: FileUpsertService::new(client.clone(), resolver.clone(), container_id.clone()),
            spreadsheets: SpreadsheetSyncService::new(client, resolver.clone(), container_id),
            bootstrapper,
            auth,
            resolver,
        }
    }

    /// Client bootstrap.
    pub fn bootstrapper(&self) -> &Arc<ClientBootstrapper> {
        &self.bootstrapper
    }

    /// Token holder.
    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    /// Name lookups.
    pub fn resolver(&self) -> &RemoteFileResolver {
        &self.resolver
    }

    /// File upserts.
    pub fn files(&self) -> &FileUpsertService {
        &self.files
    }

    /// Spreadsheet sync.
    pub fn spreadsheets(&self) -> &SpreadsheetSyncService {
        &self.spreadsheets
    }
}

/// Create the production workspace: discovery bootstrap and browser consent.
pub fn create_google_workspace(credentials: Credentials) -> Result<GoogleWorkspace> {
    let loader = Arc::new(DiscoveryRuntime::new()?);
    let consent = Arc::new(LoopbackConsent::new(credentials.client_secret().cloned())?);
    Ok(GoogleWorkspace::new(credentials, loader, consent))
}
