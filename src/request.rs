//! Request: metadata plus a pull body writer sink (spec.md §3, §4.3).
//!
//! The `Connection` streams body bytes into whichever [`BodySink`] the
//! matched [`crate::Handler`] declared (`RequestKind`); the sink owns the
//! storage (discard / memory / temp file / parsed form) the way the
//! teacher's `FileUploadService` owns a `FileWritePort` it streams into.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::HttpError;
use crate::multipart::{parse_multipart, MultipartForm};

/// Which body sink a [`crate::Handler`] wants its matched requests to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Discards the body. Used for methods that carry no meaningful body.
    Base,
    /// Buffers the body in memory, subject to [`DataSink::DEFAULT_LIMIT`].
    Data,
    /// Streams the body to a temp file (PUT, large uploads).
    File,
    /// Parses `application/x-www-form-urlencoded`.
    UrlForm,
    /// Parses `multipart/form-data` (RFC 7578), including nested
    /// `multipart/mixed`.
    Multipart,
}

/// Pull-based body writer: the mirror image of [`crate::body::BodyReader`].
/// The `Connection` calls `open`, then `write` once per chunk it decodes off
/// the wire (whether framed by `Content-Length` or chunked transfer
/// encoding), then `close` exactly once.
#[async_trait]
pub trait BodySink: Send {
    async fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpError>;

    async fn close(self: Box<Self>) -> Result<RequestBody, HttpError>;
}

/// The sink's final, handler-visible result.
pub enum RequestBody {
    None,
    Data(Bytes),
    File(PathBuf, Option<NamedTempFile>),
    UrlForm(HashMap<String, String>),
    Multipart(MultipartForm),
}

/// Discards everything written to it. Backs [`RequestKind::Base`].
#[derive(Default)]
pub struct DiscardSink;

#[async_trait]
impl BodySink for DiscardSink {
    async fn write(&mut self, _chunk: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<RequestBody, HttpError> {
        Ok(RequestBody::None)
    }
}

/// In-memory sink with an upper bound; spec.md §4.3 requires 413 once the
/// declared length exceeds an implementation limit of at least 16 MiB.
pub struct DataSink {
    buf: BytesMut,
    limit: usize,
}

impl DataSink {
    pub const DEFAULT_LIMIT: usize = 64 * 1024 * 1024;

    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }
}

impl Default for DataSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

#[async_trait]
impl BodySink for DataSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(HttpError::new(413, "request body too large"));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<RequestBody, HttpError> {
        Ok(RequestBody::Data(self.buf.freeze()))
    }
}

/// Streams the body into a caller-invisible temp file. Per spec.md §4.3 the
/// file exists for the duration of the handler call and is removed
/// automatically unless the handler takes ownership of it (e.g. to persist
/// it as the final WebDAV PUT destination).
pub struct FileSink {
    file: Option<tokio::fs::File>,
    temp: Option<NamedTempFile>,
    path: PathBuf,
}

impl FileSink {
    pub fn new_in(dir: &Path) -> io::Result<Self> {
        let temp = NamedTempFile::new_in(dir)?;
        let path = temp.path().to_path_buf();
        Ok(Self {
            file: None,
            temp: Some(temp),
            path,
        })
    }
}

#[async_trait]
impl BodySink for FileSink {
    async fn open(&mut self) -> io::Result<()> {
        self.file = Some(tokio::fs::File::create(&self.path).await?);
        Ok(())
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| HttpError::internal("FileSink not opened"))?;
        file.write_all(chunk)
            .await
            .map_err(|e| HttpError::internal("failed writing request body").with_source(e))
    }

    async fn close(mut self: Box<Self>) -> Result<RequestBody, HttpError> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }
        Ok(RequestBody::File(self.path.clone(), self.temp.take()))
    }
}

/// Buffers the full body (delegating to an inner [`DataSink`]) and parses it
/// as `application/x-www-form-urlencoded` on close: `+` decodes to space,
/// then percent-decoding, last-key-wins, undecodable pairs skipped+logged
/// per spec.md §4.3.
pub struct UrlFormSink {
    inner: DataSink,
}

impl UrlFormSink {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: DataSink::new(limit),
        }
    }
}

#[async_trait]
impl BodySink for UrlFormSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        self.inner.write(chunk).await
    }

    async fn close(self: Box<Self>) -> Result<RequestBody, HttpError> {
        let RequestBody::Data(bytes) = Box::new(self.inner).close().await? else {
            unreachable!()
        };
        let body = String::from_utf8_lossy(&bytes);
        let mut map = HashMap::new();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            let k = k.replace('+', " ");
            let v = v.replace('+', " ");
            match (crate::percent::decode_utf8(&k), crate::percent::decode_utf8(&v)) {
                (Some(k), Some(v)) => {
                    map.insert(k, v);
                }
                _ => {
                    tracing::warn!("skipping undecodable form pair: {pair:?}");
                }
            }
        }
        Ok(RequestBody::UrlForm(map))
    }
}

/// Buffers the full body and parses it as `multipart/form-data` on close.
pub struct MultipartSink {
    inner: DataSink,
    boundary: String,
    upload_dir: PathBuf,
}

impl MultipartSink {
    pub fn new(limit: usize, boundary: String, upload_dir: PathBuf) -> Self {
        Self {
            inner: DataSink::new(limit),
            boundary,
            upload_dir,
        }
    }
}

#[async_trait]
impl BodySink for MultipartSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        self.inner.write(chunk).await
    }

    async fn close(self: Box<Self>) -> Result<RequestBody, HttpError> {
        let RequestBody::Data(bytes) = Box::new(self.inner).close().await? else {
            unreachable!()
        };
        let form = parse_multipart(&bytes, &self.boundary, &self.upload_dir)
            .await
            .map_err(|e| HttpError::bad_request("invalid multipart body").with_source(e))?;
        Ok(RequestBody::Multipart(form))
    }
}

/// The server's view of an inbound HTTP request.
pub struct Request {
    pub method: String,
    pub scheme: String,
    pub host: Option<String>,
    pub raw_path: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub chunked: bool,
    pub uses_gzip: bool,
    pub attributes: HashMap<String, Vec<String>>,
    pub byte_range: Option<(u64, u64)>,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub body: RequestBody,
}

/// Well-known attribute key regex handlers store capture groups under
/// (spec.md §4.7/§9).
pub const ATTR_REGEX_CAPTURES: &str = "regex_captures";

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn captures(&self) -> &[String] {
        self.attributes
            .get(ATTR_REGEX_CAPTURES)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            RequestBody::Data(b) => Some(b),
            _ => None,
        }
    }

    pub fn body_path(&self) -> Option<&Path> {
        match &self.body {
            RequestBody::File(p, _) => Some(p),
            _ => None,
        }
    }

    /// Takes ownership of the backing temp file, so it survives past the
    /// handler call instead of being deleted when the `Request` drops.
    pub fn take_temp_file(&mut self) -> Option<NamedTempFile> {
        match &mut self.body {
            RequestBody::File(_, temp) => temp.take(),
            _ => None,
        }
    }

    pub fn url_form(&self) -> Option<&HashMap<String, String>> {
        match &self.body {
            RequestBody::UrlForm(m) => Some(m),
            _ => None,
        }
    }

    pub fn multipart(&self) -> Option<&MultipartForm> {
        match &self.body {
            RequestBody::Multipart(m) => Some(m),
            _ => None,
        }
    }
}
