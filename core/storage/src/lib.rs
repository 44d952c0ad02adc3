//! Google Drive and Sheets synchronization for reportsync.
//!
//! This crate owns the provider lifecycle and every remote mutation:
//! - [`ClientBootstrapper`] loads and initializes the provider client exactly once
//! - [`AuthSession`] holds the access token and serializes interactive consent
//! - [`RemoteFileResolver`] answers "does this object already exist"
//! - [`FileUpsertService`] and [`SpreadsheetSyncService`] create or update remote objects
//!
//! Every network call routes through the bootstrapper and then the session.

pub mod bootstrap;
pub mod gdrive;
pub mod outcome;

pub use bootstrap::{
    ApiEndpoints, BootstrapConfig, ClientBootstrapper, DiscoveryRuntime, ProviderRuntime,
    ReadinessState, RuntimeLoader, StaticRuntime, TokenRequest,
};
pub use gdrive::{
    create_google_workspace, AuthSession, ConsentFlow, DriveClient, FileUpsertService,
    GoogleWorkspace, GrantedToken, LoopbackConsent, RemoteFileResolver, RemoteObjectRef, Session,
    SpreadsheetSyncService,
};
pub use outcome::{PartialSuccess, SpreadsheetOutcome, UpsertAction, UpsertOutcome};
