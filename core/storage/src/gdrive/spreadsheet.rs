//! Multi-sheet spreadsheet synchronization.
//!
//! A spreadsheet is resolved by name. A missing document is created with all
//! requested sheets, written, moved into the container and shared. An existing
//! document gets missing sheets added, then every requested sheet is cleared
//! and rewritten so no stale cells survive.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use reportsync_common::{CallContext, Error, Result, SheetMatrix};

use super::client::{spreadsheet_edit_url, DriveClient};
use super::resolver::RemoteFileResolver;
use crate::outcome::{PartialSuccess, SpreadsheetOutcome, UpsertAction};

/// MIME type of native spreadsheets.
pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Creates or updates named multi-sheet spreadsheets.
pub struct SpreadsheetSyncService {
    client: Arc<DriveClient>,
    resolver: Arc<RemoteFileResolver>,
    container_id: Option<String>,
}

impl SpreadsheetSyncService {
    /// Create a service that moves new documents into `container_id`.
    pub fn new(
        client: Arc<DriveClient>,
        resolver: Arc<RemoteFileResolver>,
        container_id: Option<String>,
    ) -> Self {
        Self {
            client,
            resolver,
            container_id,
        }
    }

    /// Write `sheets`, in order, into the spreadsheet called `name`.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty sheet list or duplicate sheet names
    /// - `Sync` naming the failing sheet; sheets after it are not attempted
    pub async fn sync_spreadsheet(
        &self,
        name: &str,
        sheets: Vec<SheetMatrix>,
    ) -> Result<SpreadsheetOutcome> {
        self.sync_spreadsheet_with(&CallContext::default(), name, sheets)
            .await
    }

    /// [`Self::sync_spreadsheet`] bounded by a caller deadline and cancellation.
    pub async fn sync_spreadsheet_with(
        &self,
        ctx: &CallContext,
        name: &str,
        sheets: Vec<SheetMatrix>,
    ) -> Result<SpreadsheetOutcome> {
        validate(name, &sheets)?;

        ctx.run("sync_spreadsheet", async {
            let existing = self
                .resolver
                .find_by_name(name, Some(SPREADSHEET_MIME))
                .await
                .map_err(|e| retarget(e, name))?;

            let result = match existing {
                Some(doc) => self.update(name, &doc.id, &sheets).await,
                None => self.create(name, &sheets).await,
            };

            if let Err(err) = &result {
                error!(name, sheet = err.failed_sheet(), "Spreadsheet sync failed: {}", err);
            }
            result
        })
        .await
    }

    async fn create(&self, name: &str, sheets: &[SheetMatrix]) -> Result<SpreadsheetOutcome> {
        let titles: Vec<&str> = sheets.iter().map(SheetMatrix::sheet_name).collect();
        let id = self
            .client
            .create_spreadsheet(name, &titles)
            .await
            .map_err(|e| retarget(e, name))?;
        info!(name, spreadsheet_id = %id, "Created spreadsheet");

        let written = self.write_new_sheets(name, &id, sheets).await;

        // A document left outside the container is invisible to the lookup,
        // so it is moved even when a sheet write failed.
        if let Some(container) = self.container_id.as_deref() {
            let moved = self
                .client
                .move_to_container(&id, container)
                .await
                .map_err(|e| as_sync(e, "move", name));
            if let Err(err) = moved {
                if written.is_ok() {
                    return Err(err);
                }
                warn!(name, spreadsheet_id = %id, "Partially written spreadsheet was not moved: {}", err);
            }
        }
        let written = written?;

        let mut warnings = Vec::new();
        if let Err(err) = self.client.grant_public_read(&id).await {
            warn!(name, spreadsheet_id = %id, "Spreadsheet is not public: {}", err);
            warnings.push(PartialSuccess::NotPublic {
                file_id: id.clone(),
                reason: err.to_string(),
            });
        }

        Ok(SpreadsheetOutcome {
            url: spreadsheet_edit_url(&id),
            spreadsheet_id: id,
            action: UpsertAction::Created,
            sheets_written: written,
            added_sheets: Vec::new(),
            warnings,
        })
    }

    async fn write_new_sheets(
        &self,
        name: &str,
        id: &str,
        sheets: &[SheetMatrix],
    ) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            if sheet.height() > 0 {
                self.client
                    .write_sheet(id, sheet.sheet_name(), sheet.rows())
                    .await
                    .map_err(|e| retarget(e, name))?;
            }
            debug!(name, sheet = sheet.sheet_name(), rows = sheet.height(), "Sheet written");
            written.push(sheet.sheet_name().to_string());
        }
        Ok(written)
    }

    async fn update(
        &self,
        name: &str,
        id: &str,
        sheets: &[SheetMatrix],
    ) -> Result<SpreadsheetOutcome> {
        // Sheet titles are case-insensitive on the provider side.
        let mut present: HashSet<String> = self
            .client
            .sheet_titles(id)
            .await
            .map_err(|e| retarget(e, name))?
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        let mut added = Vec::new();
        let mut written = Vec::with_capacity(sheets.len());

        for sheet in sheets {
            let title = sheet.sheet_name();

            if !present.contains(&title.to_lowercase()) {
                self.client
                    .add_sheet(id, title)
                    .await
                    .map_err(|e| retarget(e, name))?;
                info!(name, sheet = title, "Added sheet");
                present.insert(title.to_lowercase());
                added.push(title.to_string());
            }

            self.client
                .clear_sheet(id, title)
                .await
                .map_err(|e| retarget(e, name))?;
            if sheet.height() > 0 {
                self.client
                    .write_sheet(id, title, sheet.rows())
                    .await
                    .map_err(|e| retarget(e, name))?;
            }
            debug!(name, sheet = title, rows = sheet.height(), "Sheet rewritten");
            written.push(title.to_string());
        }

        info!(name, spreadsheet_id = id, sheets = written.len(), "Updated spreadsheet");

        Ok(SpreadsheetOutcome {
            url: spreadsheet_edit_url(id),
            spreadsheet_id: id.to_string(),
            action: UpsertAction::Updated,
            sheets_written: written,
            added_sheets: added,
            warnings: Vec::new(),
        })
    }
}

fn validate(name: &str, sheets: &[SheetMatrix]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Spreadsheet name must not be empty".to_string(),
        ));
    }
    if sheets.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No sheets given for spreadsheet '{}'",
            name
        )));
    }

    let mut seen = HashSet::new();
    for sheet in sheets {
        if !seen.insert(sheet.sheet_name().to_lowercase()) {
            return Err(Error::InvalidInput(format!(
                "Sheet '{}' appears more than once",
                sheet.sheet_name()
            )));
        }
    }
    Ok(())
}

/// Report provider rejections as sync failures of the named document.
fn retarget(err: Error, name: &str) -> Error {
    match err {
        Error::Sync {
            operation,
            sheet,
            status,
            body,
            ..
        } => Error::Sync {
            operation,
            target: name.to_string(),
            sheet,
            status,
            body,
        },
        Error::Upload {
            operation,
            status,
            body,
            ..
        } => Error::Sync {
            operation,
            target: name.to_string(),
            sheet: None,
            status,
            body,
        },
        other => other,
    }
}

fn as_sync(err: Error, operation: &str, name: &str) -> Error {
    match retarget(err, name) {
        Error::Sync {
            target,
            sheet,
            status,
            body,
            ..
        } => Error::Sync {
            operation: operation.to_string(),
            target,
            sheet,
            status,
            body,
        },
        other => other,
    }
}
