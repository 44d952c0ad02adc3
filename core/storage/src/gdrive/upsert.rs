//! Create-or-replace uploads keyed by logical name.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};

use reportsync_common::{CallContext, Error, Result};

use super::client::{file_view_url, DriveClient};
use super::resolver::RemoteFileResolver;
use crate::outcome::{PartialSuccess, UpsertAction, UpsertOutcome};

/// Content type used when the caller gives none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Uploads binary content under a logical name, replacing it if it exists.
pub struct FileUpsertService {
    client: Arc<DriveClient>,
    resolver: Arc<RemoteFileResolver>,
    container_id: Option<String>,
}

impl FileUpsertService {
    /// Create a service that parents new files under `container_id`.
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

    /// Upload `content` as `name`, or replace the content of the existing file.
    ///
    /// # Postconditions
    /// - Exactly one remote file carries `name`; repeated calls keep its id
    /// - A newly created file is made public on a best-effort basis
    ///
    /// # Errors
    /// - `Upload` when the provider rejects the create or replace
    /// - `Authentication` when consent fails or a fresh token is rejected
    pub async fn upload_or_update(
        &self,
        content: impl Into<Bytes>,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        self.upload_or_update_with(&CallContext::default(), content, name, content_type)
            .await
    }

    /// [`Self::upload_or_update`] bounded by a caller deadline and cancellation.
    pub async fn upload_or_update_with(
        &self,
        ctx: &CallContext,
        content: impl Into<Bytes>,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        let content = content.into();
        ctx.run("upload", self.upsert(content, name, content_type))
            .await
    }

    /// Download `url` and upsert the bytes as `name`.
    pub async fn upload_from_url(
        &self,
        url: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        self.upload_from_url_with(&CallContext::default(), url, name, content_type)
            .await
    }

    /// [`Self::upload_from_url`] bounded by a caller deadline and cancellation.
    pub async fn upload_from_url_with(
        &self,
        ctx: &CallContext,
        url: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        ctx.run("upload_from_url", async {
            let content = self.client.download(url).await?;
            self.upsert(content, name, content_type).await
        })
        .await
    }

    async fn upsert(
        &self,
        content: Bytes,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<UpsertOutcome> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("File name must not be empty".to_string()));
        }
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);

        let existing = self.resolver.find_file(name).await?;

        match existing {
            Some(file) => {
                self.client
                    .replace_content(&file.id, content_type, content)
                    .await
                    .map_err(|e| retarget(e, name))?;
                info!(name, file_id = %file.id, "Updated file");

                Ok(UpsertOutcome {
                    url: file_view_url(&file.id),
                    file_id: file.id,
                    action: UpsertAction::Updated,
                    warnings: Vec::new(),
                })
            }
            None => {
                let created = self
                    .client
                    .create_multipart(name, self.container_id.as_deref(), content_type, content)
                    .await?;
                info!(name, file_id = %created.id, "Created file");

                let mut warnings = Vec::new();
                if let Err(err) = self.client.grant_public_read(&created.id).await {
                    warn!(name, file_id = %created.id, "File is not public: {}", err);
                    warnings.push(PartialSuccess::NotPublic {
                        file_id: created.id.clone(),
                        reason: err.to_string(),
                    });
                }

                Ok(UpsertOutcome {
                    url: file_view_url(&created.id),
                    file_id: created.id,
                    action: UpsertAction::Created,
                    warnings,
                })
            }
        }
    }
}

/// Report provider rejections against the logical name rather than the id.
fn retarget(err: Error, name: &str) -> Error {
    match err {
        Error::Upload {
            operation,
            status,
            body,
            ..
        } => Error::Upload {
            operation,
            target: name.to_string(),
            status,
            body,
        },
        other => other,
    }
}
