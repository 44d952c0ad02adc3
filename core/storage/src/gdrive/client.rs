//! Authorized Google Drive and Sheets API client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use reportsync_common::{CellValue, Error, Result};

use super::auth::AuthSession;
use crate::bootstrap::{ClientBootstrapper, ProviderRuntime};

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink,modifiedTime";

/// Whole addressable area cleared before a sheet is rewritten.
const CLEAR_EXTENT: &str = "A1:ZZ";

/// Characters escaped when an A1 range is placed in a URL path.
const RANGE_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b':');

/// Read-only snapshot of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObjectRef {
    /// File ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Browser URL reported by Drive.
    #[serde(default, rename = "webViewLink")]
    pub view_url: Option<String>,
    /// Last modification.
    #[serde(default, rename = "modifiedTime")]
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteObjectRef>,
}

#[derive(Debug, Deserialize)]
struct Parents {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetSheets {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Public view URL of a Drive file.
pub fn file_view_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

/// Edit URL of a spreadsheet.
pub fn spreadsheet_edit_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}/edit", spreadsheet_id)
}

/// A1 notation for `cells` on `sheet`, quoting the sheet name.
pub fn a1_range(sheet: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cells)
}

fn range_path(sheet: &str, cells: &str) -> String {
    utf8_percent_encode(&a1_range(sheet, cells), RANGE_PATH).to_string()
}

/// Drive and Sheets REST client.
///
/// Every request waits for bootstrap, carries the session's bearer token,
/// and is retried once with a fresh token when the provider answers 401.
pub struct DriveClient {
    bootstrapper: Arc<ClientBootstrapper>,
    auth: Arc<AuthSession>,
}

impl DriveClient {
    /// Create a client over an existing bootstrapper and session.
    pub fn new(bootstrapper: Arc<ClientBootstrapper>, auth: Arc<AuthSession>) -> Self {
        Self { bootstrapper, auth }
    }

    /// Send a request built by `build`, re-authenticating once on 401.
    async fn send<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn(&ProviderRuntime) -> RequestBuilder,
    {
        let runtime = self.bootstrapper.runtime().await?;
        let token = self.auth.ensure_token().await?;

        let response = Self::dispatch(&runtime, &build, &token, operation).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(operation, "Token rejected, re-authenticating once");
        self.auth.invalidate(&token).await;
        let token = self.auth.ensure_token().await?;

        let response = Self::dispatch(&runtime, &build, &token, operation).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            self.auth.invalidate(&token).await;
            return Err(Error::Authentication(format!(
                "Token rejected during {}: {}",
                operation, body
            )));
        }
        Ok(response)
    }

    async fn dispatch<F>(
        runtime: &ProviderRuntime,
        build: &F,
        token: &str,
        operation: &str,
    ) -> Result<Response>
    where
        F: Fn(&ProviderRuntime) -> RequestBuilder,
    {
        let response = build(runtime)
            .bearer_auth(token)
            .query(&[("key", runtime.api_key.expose())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", operation, e)))?;

        debug!(operation, status = response.status().as_u16(), "Provider call");
        Ok(response)
    }

    /// First file matching a Drive query, if any.
    pub async fn find_first(&self, query: &str) -> Result<Option<RemoteObjectRef>> {
        let response = self
            .send("lookup", |rt| {
                rt.http
                    .get(format!("{}/files", rt.endpoints.drive_base))
                    .query(&[
                        ("q", query),
                        ("fields", "files(id,name,mimeType,webViewLink,modifiedTime)"),
                        ("pageSize", "1"),
                    ])
            })
            .await?;

        let list: FileList = read_json(response, upload_error("lookup", query)).await?;
        Ok(list.files.into_iter().next())
    }

    /// Create a file with metadata and content in one multipart request.
    pub async fn create_multipart(
        &self,
        name: &str,
        parent_id: Option<&str>,
        content_type: &str,
        content: Bytes,
    ) -> Result<RemoteObjectRef> {
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }
        let metadata_json = serde_json::to_string(&metadata)?;

        let boundary = format!("reportsync-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata_json, content_type, &content);

        let response = self
            .send("create", |rt| {
                rt.http
                    .post(format!("{}/files", rt.endpoints.upload_base))
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", boundary),
                    )
                    .body(body.clone())
            })
            .await?;

        read_json(response, upload_error("create", name)).await
    }

    /// Replace the content of an existing file without touching its metadata.
    pub async fn replace_content(
        &self,
        file_id: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<RemoteObjectRef> {
        let response = self
            .send("replace", |rt| {
                rt.http
                    .patch(format!("{}/files/{}", rt.endpoints.upload_base, file_id))
                    .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
                    .header(header::CONTENT_TYPE, content_type)
                    .body(content.clone())
            })
            .await?;

        read_json(response, upload_error("replace", file_id)).await
    }

    /// Grant read access to anyone with the link.
    pub async fn grant_public_read(&self, file_id: &str) -> Result<()> {
        let response = self
            .send("grant_permission", |rt| {
                rt.http
                    .post(format!("{}/files/{}/permissions", rt.endpoints.drive_base, file_id))
                    .json(&serde_json::json!({ "role": "reader", "type": "anyone" }))
            })
            .await?;

        read_empty(response, upload_error("grant_permission", file_id)).await
    }

    /// Reparent a file so its only parent is `container_id`.
    pub async fn move_to_container(&self, file_id: &str, container_id: &str) -> Result<()> {
        let response = self
            .send("read_parents", |rt| {
                rt.http
                    .get(format!("{}/files/{}", rt.endpoints.drive_base, file_id))
                    .query(&[("fields", "parents")])
            })
            .await?;
        let current: Parents = read_json(response, upload_error("move", file_id)).await?;

        let previous: Vec<&str> = current
            .parents
            .iter()
            .map(String::as_str)
            .filter(|p| *p != container_id)
            .collect();
        let remove = previous.join(",");

        let response = self
            .send("move", |rt| {
                let mut request = rt
                    .http
                    .patch(format!("{}/files/{}", rt.endpoints.drive_base, file_id))
                    .query(&[("addParents", container_id), ("fields", "id,parents")]);
                if !remove.is_empty() {
                    request = request.query(&[("removeParents", remove.as_str())]);
                }
                request.json(&serde_json::json!({}))
            })
            .await?;

        read_empty(response, upload_error("move", file_id)).await
    }

    /// Fetch arbitrary content over the shared HTTP client, without credentials.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let runtime = self.bootstrapper.runtime().await?;

        let response = runtime
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upload_error("download", url)(status.as_u16(), body));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read download response: {}", e)))
    }

    /// Create a spreadsheet with one sheet per title; returns its id.
    pub async fn create_spreadsheet(&self, title: &str, sheet_titles: &[&str]) -> Result<String> {
        let sheets: Vec<_> = sheet_titles
            .iter()
            .map(|t| serde_json::json!({ "properties": { "title": t } }))
            .collect();
        let body = serde_json::json!({
            "properties": { "title": title },
            "sheets": sheets,
        });

        let response = self
            .send("create_spreadsheet", |rt| {
                rt.http
                    .post(format!("{}/spreadsheets", rt.endpoints.sheets_base))
                    .json(&body)
            })
            .await?;

        let created: CreatedSpreadsheet =
            read_json(response, sync_error("create", title, None)).await?;
        Ok(created.spreadsheet_id)
    }

    /// Titles of the sheets inside a spreadsheet.
    pub async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let response = self
            .send("read_sheets", |rt| {
                rt.http
                    .get(format!(
                        "{}/spreadsheets/{}",
                        rt.endpoints.sheets_base, spreadsheet_id
                    ))
                    .query(&[("fields", "sheets.properties.title")])
            })
            .await?;

        let meta: SpreadsheetSheets =
            read_json(response, sync_error("read_sheets", spreadsheet_id, None)).await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    /// Add an empty sheet through a structural batch update.
    pub async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let body = serde_json::json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });

        let response = self
            .send("add_sheet", |rt| {
                rt.http
                    .post(format!(
                        "{}/spreadsheets/{}:batchUpdate",
                        rt.endpoints.sheets_base, spreadsheet_id
                    ))
                    .json(&body)
            })
            .await?;

        read_empty(response, sync_error("add_sheet", spreadsheet_id, Some(title))).await
    }

    /// Blank the whole addressable area of a sheet.
    pub async fn clear_sheet(&self, spreadsheet_id: &str, sheet: &str) -> Result<()> {
        let range = range_path(sheet, CLEAR_EXTENT);

        let response = self
            .send("clear", |rt| {
                rt.http
                    .post(format!(
                        "{}/spreadsheets/{}/values/{}:clear",
                        rt.endpoints.sheets_base, spreadsheet_id, range
                    ))
                    .json(&serde_json::json!({}))
            })
            .await?;

        read_empty(response, sync_error("clear", spreadsheet_id, Some(sheet))).await
    }

    /// Write `rows` starting at A1, as raw values.
    pub async fn write_sheet(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        rows: &[Vec<CellValue>],
    ) -> Result<()> {
        let range = a1_range(sheet, "A1");
        let path = range_path(sheet, "A1");
        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .send("write", |rt| {
                rt.http
                    .put(format!(
                        "{}/spreadsheets/{}/values/{}",
                        rt.endpoints.sheets_base, spreadsheet_id, path
                    ))
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body)
            })
            .await?;

        read_empty(response, sync_error("write", spreadsheet_id, Some(sheet))).await
    }
}

fn multipart_related(boundary: &str, metadata_json: &str, content_type: &str, content: &[u8]) -> Bytes {
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 256);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    Bytes::from(body)
}

fn upload_error<'a>(operation: &'a str, target: &'a str) -> impl FnOnce(u16, String) -> Error + 'a {
    move |status, body| Error::Upload {
        operation: operation.to_string(),
        target: target.to_string(),
        status,
        body,
    }
}

fn sync_error<'a>(
    operation: &'a str,
    target: &'a str,
    sheet: Option<&'a str>,
) -> impl FnOnce(u16, String) -> Error + 'a {
    move |status, body| Error::Sync {
        operation: operation.to_string(),
        target: target.to_string(),
        sheet: sheet.map(str::to_string),
        status,
        body,
    }
}

async fn read_json<T, E>(response: Response, reject: E) -> Result<T>
where
    T: DeserializeOwned,
    E: FnOnce(u16, String) -> Error,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(reject(status.as_u16(), body));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
}

async fn read_empty<E>(response: Response, reject: E) -> Result<()>
where
    E: FnOnce(u16, String) -> Error,
{
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(reject(status.as_u16(), body))
    }
}
