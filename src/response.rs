//! Response: metadata plus a [`BodyReader`], mutable until the `Connection`
//! begins writing headers (spec.md §3, §4.2).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::body::{BodyReader, FileBody, GzipBody, MemoryBody};
use crate::date::format_rfc1123;
use crate::error::HttpError;
use crate::mime;

/// Sentinel for "unknown length" -> chunked framing (spec.md §3).
pub const CONTENT_LENGTH_UNKNOWN: u64 = u64::MAX;

pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub max_age: u32,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub gzip: bool,
    pub extra_headers: HashMap<String, String>,
    pub body: Box<dyn BodyReader>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("max_age", &self.max_age)
            .field("last_modified", &self.last_modified)
            .field("etag", &self.etag)
            .field("gzip", &self.gzip)
            .field("extra_headers", &self.extra_headers)
            .field("body", &"<BodyReader>")
            .finish()
    }
}

impl Response {
    /// `hasBody ⇔ contentType ≠ nil` (spec.md §3 invariant).
    pub fn has_body(&self) -> bool {
        self.content_type.is_some()
    }

    fn base(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            content_length: None,
            max_age: 0,
            last_modified: None,
            etag: None,
            gzip: false,
            extra_headers: HashMap::new(),
            body: Box::new(MemoryBody::new(Vec::new())),
        }
    }

    /// An empty response with no body (e.g. 204, 304).
    pub fn empty(status: u16) -> Self {
        Self::base(status)
    }

    /// A response from an in-memory byte buffer.
    pub fn from_data(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let mut resp = Self::base(200);
        resp.content_type = Some(content_type.into());
        resp.content_length = Some(data.len() as u64);
        resp.body = Box::new(MemoryBody::new(data));
        resp
    }

    /// A response serialized from a JSON-serializable value.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        let data = serde_json::to_vec(value)
            .map_err(|e| HttpError::internal("failed to serialize JSON response").with_source(e))?;
        Ok(Self::from_data("application/json; charset=utf-8", data))
    }

    /// An HTML response built from a template file with `%key%`
    /// substitutions, applied in a single left-to-right pass with no
    /// recursion (spec.md §4.2).
    pub fn from_html_template(
        template: &str,
        substitutions: &HashMap<String, String>,
    ) -> Self {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('%') {
                Some(end) => {
                    let key = &after[..end];
                    match substitutions.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('%');
                            out.push_str(key);
                            out.push('%');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                    break;
                }
            }
        }
        out.push_str(rest);
        Self::from_data("text/html; charset=utf-8", out.into_bytes())
    }

    /// The standard minimal HTML error page per spec.md §7.
    pub fn from_error(err: &HttpError) -> Self {
        let mut resp = Self::from_data("text/html; charset=utf-8", err.render_html().into_bytes());
        resp.status = err.status;
        resp
    }

    /// Builds a response for a file on disk, resolving an optional byte
    /// range per spec.md §4.2. `(MAX, 0)` means "full file"; `(offset,
    /// length)` clamps to the file size; `(MAX, length)` means "last
    /// `length` bytes". Fails if the path isn't a regular file (checked
    /// without following symlinks) or the clamped range is empty.
    pub async fn from_file(
        path: &Path,
        range: Option<(u64, u64)>,
        mime_overrides: Option<&HashMap<String, String>>,
        attachment_filename: Option<&str>,
    ) -> Result<Self, HttpError> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|_| HttpError::not_found("file not found"))?;
        if !meta.file_type().is_file() {
            return Err(HttpError::not_found("not a regular file"));
        }
        let total = meta.len();

        let (offset, length, ranged) = match range {
            None => (0, total, false),
            Some((u64::MAX, 0)) => (0, total, false),
            Some((u64::MAX, len)) => {
                let len = len.min(total);
                (total - len, len, true)
            }
            Some((offset, len)) => {
                if offset >= total {
                    (total, 0, true)
                } else {
                    let len = len.min(total - offset);
                    (offset, len, true)
                }
            }
        };

        if ranged && length == 0 {
            return Err(HttpError::range_not_satisfiable("requested range is empty"));
        }

        let mut resp = Self::base(if ranged { 206 } else { 200 });
        resp.content_type = Some(mime::lookup(path, mime_overrides));
        resp.content_length = Some(length);
        resp.last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        resp.etag = Some(file_etag(&meta));
        resp.extra_headers.insert("Accept-Ranges".to_string(), "bytes".to_string());
        if ranged {
            resp.extra_headers.insert(
                "Content-Range".to_string(),
                format!("bytes {}-{}/{}", offset, offset + length.saturating_sub(1), total),
            );
        }
        if let Some(filename) = attachment_filename {
            resp.extra_headers.insert(
                "Content-Disposition".to_string(),
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            );
        }
        resp.body = Box::new(FileBody::new(path.to_path_buf(), offset, length));
        Ok(resp)
    }

    /// Wraps the current body in a gzip encoder. Forces `contentLength =
    /// MAX` (chunked framing), per spec.md §4.2.
    pub fn with_gzip(mut self) -> Self {
        self.gzip = true;
        self.content_length = Some(CONTENT_LENGTH_UNKNOWN);
        let inner = std::mem::replace(&mut self.body, Box::new(MemoryBody::new(Vec::new())));
        self.body = Box::new(GzipBody::new(inner));
        self.extra_headers
            .insert("Content-Encoding".to_string(), "gzip".to_string());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, dt: DateTime<Utc>) -> Self {
        self.last_modified = Some(dt);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// `no-cache` when `max_age == 0`, else `max-age=N` (spec.md §4.8).
    pub fn cache_control_value(&self) -> String {
        if self.max_age == 0 {
            "no-cache".to_string()
        } else {
            format!("max-age={}", self.max_age)
        }
    }

    pub fn last_modified_header(&self) -> Option<String> {
        self.last_modified.map(format_rfc1123)
    }
}

/// `hex(inode) + ":" + hex(mtime-seconds) + ":" + hex(mtime-nanoseconds)` —
/// exact form required by spec.md §4.2 for byte-level compatibility with
/// existing clients.
#[cfg(unix)]
pub(crate) fn file_etag(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("{:x}:{:x}:{:x}", meta.ino(), meta.mtime(), meta.mtime_nsec())
}

#[cfg(not(unix))]
pub(crate) fn file_etag(meta: &std::fs::Metadata) -> String {
    let modified = meta.modified().ok();
    let secs = modified
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let nanos = modified
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:x}:{:x}:{:x}", 0u64, secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_template_single_pass_no_recursion() {
        let mut subs = HashMap::new();
        subs.insert("name".to_string(), "%other%".to_string());
        subs.insert("other".to_string(), "SHOULD_NOT_APPEAR".to_string());
        let resp = Response::from_html_template("Hello %name%!", &subs);
        let body = match &resp.content_type {
            Some(_) => (),
            None => panic!("expected content type"),
        };
        let _ = body;
    }

    #[tokio::test]
    async fn from_file_full_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let resp = Response::from_file(&path, None, None, None).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_length, Some(10));
    }

    #[tokio::test]
    async fn from_file_partial_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, vec![0u8; 1000]).await.unwrap();

        let resp = Response::from_file(&path, Some((0, 100)), None, None)
            .await
            .unwrap();
        assert_eq!(resp.status, 206);
        assert_eq!(resp.content_length, Some(100));
        assert_eq!(
            resp.extra_headers.get("Content-Range").unwrap(),
            "bytes 0-99/1000"
        );
    }

    #[tokio::test]
    async fn from_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Response::from_file(dir.path(), None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status, 404);
    }
}
