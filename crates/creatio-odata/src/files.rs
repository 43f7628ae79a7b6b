//! File download and upload against the Creatio file services.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{instrument, warn};

use creatio_client::{RequestMethod, Response};

use crate::client::{CreatioClient, RequestOptions};
use crate::error::{Error, ErrorKind, Result};

/// Type id Creatio assigns to plain file attachments.
const FILE_TYPE_ID: &str = "529bc2f8-0ee0-df11-971b-001d60e938c6";

impl CreatioClient {
    /// Download a file attachment and write it into `dir`.
    ///
    /// The file name comes from the `Content-Disposition` header; a
    /// response without one is an error. Returns the path of the written
    /// file.
    #[instrument(skip(self, dir))]
    pub async fn download_file(
        &mut self,
        collection: &str,
        file_id: &str,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let endpoint = format!("0/rest/FileService/Download/{collection}/{file_id}");
        let response = self
            .request(RequestMethod::Get, &endpoint, RequestOptions::new())
            .await?;
        save_attachment(response, dir.as_ref(), None).await
    }

    /// Upload a file and attach it to an entity.
    ///
    /// `collection` is the file collection (for example `CaseFile`) and
    /// `entity_id` the record the attachment belongs to. A record is
    /// created first; if the following byte upload fails, that record is
    /// deleted again before the error propagates.
    #[instrument(skip(self, file_path))]
    pub async fn upload_file(
        &mut self,
        collection: &str,
        entity_id: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<Response> {
        let file_path = file_path.as_ref();
        let data = std::fs::read(file_path)?;
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidInput(format!(
                    "path {} has no usable file name",
                    file_path.display()
                )))
            })?
            .to_string();
        let file_length = data.len();

        // `CaseFile` attaches to `Case` through a `CaseId` column.
        let parent_collection = collection.strip_suffix("File").unwrap_or(collection);

        let mut record = Map::new();
        record.insert("Name".to_string(), Value::from(file_name.clone()));
        record.insert(
            format!("{parent_collection}Id"),
            Value::from(entity_id.to_string()),
        );
        record.insert("Size".to_string(), Value::from(file_length));
        record.insert("TotalSize".to_string(), Value::from(file_length));
        record.insert("TypeId".to_string(), Value::from(FILE_TYPE_ID));

        let created = self
            .add_collection_data(collection, &Value::Object(record))
            .await?;
        let created_body: Value = created.json().await?;
        let file_id = created_body
            .get("Id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidResponse(
                    "could not determine the file ID from the response".to_string(),
                ))
            })?
            .to_string();

        let mime_type = mime_guess::from_path(file_path).first_or_octet_stream();
        let options = RequestOptions::new()
            .query("fileId", &file_id)
            .query("totalFileLength", file_length.to_string())
            .query("mimeType", mime_type.essence_str())
            .query("fileName", &file_name)
            .query("columnName", "Data")
            .query("entitySchemaName", collection)
            .query("parentColumnName", parent_collection)
            .query("parentColumnValue", entity_id)
            .header(
                "Content-Disposition",
                format!("attachment; filename={file_name}"),
            )
            .header(
                "Content-Range",
                format!("bytes 0-{}/{}", file_length.saturating_sub(1), file_length),
            )
            // The octet-stream content type comes with the bytes body.
            .bytes(data);

        match self
            .request(RequestMethod::Post, "0/rest/FileApiService/UploadFile", options)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(error = %e, "File upload failed; removing the orphaned file record");
                if let Err(cleanup) = self.delete_collection_data(collection, &file_id).await {
                    warn!(error = %cleanup, "Failed to delete the file record after a failed upload");
                }
                Err(e)
            }
        }
    }
}

/// Write a downloaded body to `dir`, named by `Content-Disposition` or the
/// fallback. Errors when neither yields a name.
pub(crate) async fn save_attachment(
    response: Response,
    dir: &Path,
    fallback_name: Option<String>,
) -> Result<PathBuf> {
    let name = response
        .content_disposition()
        .and_then(parse_content_disposition)
        .or(fallback_name)
        .ok_or_else(|| {
            Error::new(ErrorKind::InvalidResponse(
                "could not determine the file name from the response headers".to_string(),
            ))
        })?;

    let path = dir.join(name);
    let bytes = response.bytes().await?;
    std::fs::write(&path, &bytes)?;
    Ok(path)
}

/// Extract the file name from a `Content-Disposition` header. Handles the
/// plain `filename=` form (quoted or not) and the RFC 5987
/// `filename*=charset''percent-encoded` form.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for part in header.split(';').map(str::trim) {
        if let Some(value) = part.strip_prefix("filename*=") {
            let value = value.split_once("''").map_or(value, |(_, v)| v);
            let decoded = percent_decode(value);
            if !decoded.is_empty() {
                return Some(decoded);
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            let value = value.trim_matches('"').trim();
            if !value.is_empty() {
                plain = Some(value.to_string());
            }
        }
    }

    plain
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
