//! Body Reader: the pull-based byte producer behind every [`crate::Response`]
//! (spec.md §4.1). Readers are opened, pulled with `read()` until an empty
//! successful read signals EOF, then closed. A reader may wrap another
//! (the gzip encoder chain wraps a file/memory reader).
//!
//! The spec allows an optional synchronous variant alongside the async one;
//! this crate runs entirely on tokio (as the teacher does), so `BodyReader`
//! is modeled as a single async trait rather than carrying an unused
//! synchronous path — see DESIGN.md's Open Question notes.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write as _;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Pull-based byte producer. `read()` returning `Ok(Bytes::new())` signals
/// EOF. Implementations must be re-entrant across `open`/`close` but are
/// never pulled concurrently by the `Connection`.
#[async_trait]
pub trait BodyReader: Send + Sync {
    async fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn read(&mut self) -> io::Result<Bytes>;

    async fn close(&mut self) {}
}

/// Serves a fixed in-memory byte buffer in one shot.
pub struct MemoryBody {
    data: Option<Bytes>,
}

impl MemoryBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

#[async_trait]
impl BodyReader for MemoryBody {
    async fn read(&mut self) -> io::Result<Bytes> {
        Ok(self.data.take().unwrap_or_default())
    }
}

/// Streams a slice of a file in fixed-size chunks, per spec.md §4.2's
/// "read in 32 KiB chunks" instruction.
pub struct FileBody {
    file: Option<File>,
    path: PathBuf,
    pending_seek: Option<u64>,
    remaining: u64,
    chunk_size: usize,
}

impl FileBody {
    pub const CHUNK_SIZE: usize = 32 * 1024;

    /// `offset`/`length` describe the already-clamped byte range to stream;
    /// callers resolve the full-file case to `(0, file_len)` before
    /// constructing this.
    pub fn new(path: PathBuf, offset: u64, length: u64) -> Self {
        Self {
            file: None,
            path,
            pending_seek: Some(offset),
            remaining: length,
            chunk_size: Self::CHUNK_SIZE,
        }
    }
}

#[async_trait]
impl BodyReader for FileBody {
    async fn open(&mut self) -> io::Result<()> {
        let mut file = File::open(&self.path).await?;
        if let Some(offset) = self.pending_seek.take() {
            if offset != 0 {
                file.seek(std::io::SeekFrom::Start(offset)).await?;
            }
        }
        self.file = Some(file);
        Ok(())
    }

    async fn read(&mut self) -> io::Result<Bytes> {
        if self.remaining == 0 {
            return Ok(Bytes::new());
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "FileBody not opened"))?;
        let want = self.chunk_size.min(self.remaining as usize);
        let mut buf = vec![0u8; want];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            self.remaining = 0;
            return Ok(Bytes::new());
        }
        buf.truncate(n);
        self.remaining -= n as u64;
        Ok(Bytes::from(buf))
    }

    async fn close(&mut self) {
        self.file = None;
    }
}

/// Wraps a [`BodyReader`] with a streaming gzip encoder. Enabling this on a
/// [`crate::Response`] forces `contentLength = MAX` (chunked framing), per
/// spec.md §4.2.
pub struct GzipBody {
    inner: Box<dyn BodyReader>,
    encoder: Option<GzEncoder<Vec<u8>>>,
    inner_eof: bool,
}

impl GzipBody {
    pub fn new(inner: Box<dyn BodyReader>) -> Self {
        Self {
            inner,
            encoder: None,
            inner_eof: false,
        }
    }
}

#[async_trait]
impl BodyReader for GzipBody {
    async fn open(&mut self) -> io::Result<()> {
        self.inner.open().await?;
        self.encoder = Some(GzEncoder::new(Vec::new(), Compression::default()));
        Ok(())
    }

    async fn read(&mut self) -> io::Result<Bytes> {
        loop {
            let encoder = self
                .encoder
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "GzipBody not opened"))?;

            if !self.inner_eof {
                let chunk = self.inner.read().await?;
                if chunk.is_empty() {
                    self.inner_eof = true;
                    let finished = self.encoder.take().unwrap().finish()?;
                    return Ok(Bytes::from(finished));
                }
                encoder.write_all(&chunk)?;
                encoder.flush()?;
                let produced = std::mem::take(encoder.get_mut());
                if !produced.is_empty() {
                    return Ok(Bytes::from(produced));
                }
                // Flushed but the encoder had nothing ready yet; pull more input.
                continue;
            }

            return Ok(Bytes::new());
        }
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn memory_body_yields_once_then_eof() {
        let mut body = MemoryBody::new(Bytes::from_static(b"hello"));
        assert_eq!(body.read().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(body.read().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn file_body_streams_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut f = tokio::fs::File::create(&path).await.unwrap();
        let content = vec![7u8; 70_000];
        f.write_all(&content).await.unwrap();
        f.flush().await.unwrap();

        let mut body = FileBody::new(path, 0, content.len() as u64);
        body.open().await.unwrap();
        let mut collected = Vec::new();
        loop {
            let chunk = body.read().await.unwrap();
            if chunk.is_empty() {
                break;
            }
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, content);
    }

    #[tokio::test]
    async fn file_body_respects_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut body = FileBody::new(path, 2, 3);
        body.open().await.unwrap();
        let chunk = body.read().await.unwrap();
        assert_eq!(&chunk[..], b"234");
        assert_eq!(body.read().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn gzip_body_round_trips() {
        let inner = Box::new(MemoryBody::new(Bytes::from_static(b"hello world")));
        let mut gz = GzipBody::new(inner);
        gz.open().await.unwrap();
        let mut compressed = Vec::new();
        loop {
            let chunk = gz.read().await.unwrap();
            if chunk.is_empty() {
                break;
            }
            compressed.extend_from_slice(&chunk);
        }
        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}
