//! Results of remote mutations.

use std::fmt;

/// Something that went wrong after the content was durably stored.
///
/// Attached to successful outcomes instead of being raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialSuccess {
    /// The public-read grant was rejected; the object exists but is private.
    NotPublic {
        /// Remote object id.
        file_id: String,
        /// Why the grant failed.
        reason: String,
    },
}

impl fmt::Display for PartialSuccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialSuccess::NotPublic { file_id, reason } => {
                write!(f, "{} is stored but not publicly readable: {}", file_id, reason)
            }
        }
    }
}

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// No object with the name existed; one was created.
    Created,
    /// An existing object was updated in place.
    Updated,
}

/// Result of [`crate::FileUpsertService::upload_or_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Remote id, stable across repeated upserts of the same name.
    pub file_id: String,
    /// Public view URL.
    pub url: String,
    /// Create or update.
    pub action: UpsertAction,
    /// Non-fatal problems.
    pub warnings: Vec<PartialSuccess>,
}

/// Result of [`crate::SpreadsheetSyncService::sync_spreadsheet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetOutcome {
    /// Remote spreadsheet id.
    pub spreadsheet_id: String,
    /// Edit URL.
    pub url: String,
    /// Create or update.
    pub action: UpsertAction,
    /// Sheets written, in the order they were processed.
    pub sheets_written: Vec<String>,
    /// Sheets added to an existing document.
    pub added_sheets: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<PartialSuccess>,
}

impl SpreadsheetOutcome {
    /// Whether the sync finished without warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
