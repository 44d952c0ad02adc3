//! Name-based lookup of remote objects.

use std::sync::Arc;
use tracing::debug;

use reportsync_common::{Error, Result};

use super::client::{DriveClient, RemoteObjectRef};

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn escape_query_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Mime prefix shared by Docs, Sheets and the other native formats.
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Build the Drive query for an exact, non-trashed name match.
pub fn build_query(name: &str, mime_type: Option<&str>, parent_id: Option<&str>) -> String {
    let mime_clause = mime_type.map(|mime| format!("mimeType = '{}'", escape_query_value(mime)));
    join_clauses(name, mime_clause, parent_id)
}

/// Like [`build_query`], but never matches a native document. Those reject
/// media content, so a same-named Doc or Sheet must not stand in for a file.
pub fn build_file_query(name: &str, parent_id: Option<&str>) -> String {
    let mime_clause = format!("not mimeType contains '{}'", NATIVE_MIME_PREFIX);
    join_clauses(name, Some(mime_clause), parent_id)
}

fn join_clauses(name: &str, mime_clause: Option<String>, parent_id: Option<&str>) -> String {
    let mut clauses = vec![format!("name = '{}'", escape_query_value(name))];
    clauses.extend(mime_clause);
    if let Some(parent) = parent_id {
        clauses.push(format!("'{}' in parents", escape_query_value(parent)));
    }
    clauses.push("trashed = false".to_string());
    clauses.join(" and ")
}

/// Finds at most one remote object by logical name.
pub struct RemoteFileResolver {
    client: Arc<DriveClient>,
    container_id: Option<String>,
}

impl RemoteFileResolver {
    /// Create a resolver; lookups are confined to `container_id` when set.
    pub fn new(client: Arc<DriveClient>, container_id: Option<String>) -> Self {
        Self {
            client,
            container_id,
        }
    }

    /// Find the first object named `name`, optionally of `mime_type`.
    ///
    /// An empty result is `Ok(None)`, never an error.
    pub async fn find_by_name(
        &self,
        name: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<RemoteObjectRef>> {
        let query = build_query(name, mime_type, self.container_id.as_deref());
        self.find(name, &query).await
    }

    /// Find the first plain file named `name`, skipping native documents.
    pub async fn find_file(&self, name: &str) -> Result<Option<RemoteObjectRef>> {
        let query = build_file_query(name, self.container_id.as_deref());
        self.find(name, &query).await
    }

    async fn find(&self, name: &str, query: &str) -> Result<Option<RemoteObjectRef>> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Name must not be empty".to_string()));
        }

        let found = self.client.find_first(query).await?;

        debug!(
            name,
            found = found.as_ref().map(|f| f.id.as_str()),
            "Resolved remote object"
        );
        Ok(found)
    }
}
