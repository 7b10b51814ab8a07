//! Request-line and header parsing, and the chunked transfer-encoding body
//! reader, per spec.md §4.4.
//!
//! Grounded on the read-until-CRLFCRLF-then-parse shape from
//! `examples/other_examples/75e79216_tomaka-rouille__src-socket_handler-http1.rs.rs`,
//! with `httparse` doing the actual header-grammar work (the same crate
//! `hyper` uses for this).

use std::collections::HashMap;
use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version_minor: u8,
}

#[derive(Debug)]
pub struct ParsedHead {
    pub line: RequestLine,
    /// Lower-cased header names; repeated headers collapse "last wins"
    /// except `Set-Cookie`, which this server never emits on requests it
    /// parses so that carve-out never applies here.
    pub headers: HashMap<String, String>,
}

/// Reads and parses one request head (request-line + headers) from `stream`,
/// consuming exactly the bytes up to and including the terminating
/// CRLFCRLF. `leftover` carries any body bytes that were over-read as part
/// of the same TCP segment.
pub async fn read_head<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut BytesMut,
) -> io::Result<Option<ParsedHead>> {
    loop {
        if let Some(head_end) = find_crlfcrlf(buf) {
            let head_bytes = buf.split_to(head_end + 4);
            return parse_head(&head_bytes).map(Some);
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-headers"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_crlfcrlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head_bytes: &[u8]) -> io::Result<ParsedHead> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut header_storage);
    match req.parse(head_bytes) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed request head")),
    }

    let method = req
        .method
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing method"))?
        .to_ascii_uppercase();
    let target = req
        .path
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing request target"))?
        .to_string();
    let version_minor = req.version.unwrap_or(1);

    let mut headers = HashMap::new();
    for h in req.headers.iter() {
        let name = h.name.to_ascii_lowercase();
        let value = std::str::from_utf8(h.value)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF8 header value"))?
            .trim()
            .to_string();
        if name == "set-cookie" {
            continue;
        }
        headers.insert(name, value);
    }

    Ok(ParsedHead {
        line: RequestLine {
            method,
            target,
            version_minor,
        },
        headers,
    })
}

/// Reads a `Transfer-Encoding: chunked` body, tolerating chunk-extensions
/// and discarding the trailer, invoking `on_chunk` once per decoded chunk.
/// `leftover` holds bytes already read past the header block.
pub async fn read_chunked_body<R, F>(
    stream: &mut R,
    leftover: &mut BytesMut,
    mut on_chunk: F,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> io::Result<()>,
{
    loop {
        let size_line = read_line(stream, leftover).await?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size"))?;

        if size == 0 {
            // Discard trailer headers up to the terminating blank line.
            loop {
                let line = read_line(stream, leftover).await?;
                if line.is_empty() {
                    break;
                }
            }
            return Ok(());
        }

        let chunk = read_exact_buffered(stream, leftover, size).await?;
        on_chunk(&chunk)?;

        // Each chunk is followed by a bare CRLF.
        let trailing = read_line(stream, leftover).await?;
        if !trailing.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed chunk terminator"));
        }
    }
}

async fn fill_at_least<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut BytesMut,
    needed: usize,
) -> io::Result<()> {
    while buf.len() < needed {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-body"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

async fn read_line<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut BytesMut) -> io::Result<String> {
    loop {
        if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf.split_to(pos);
            buf.advance(2);
            return String::from_utf8(line.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF8 chunk line"));
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-chunk"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn read_exact_buffered<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut BytesMut,
    n: usize,
) -> io::Result<Vec<u8>> {
    fill_at_least(stream, buf, n).await?;
    let data = buf.split_to(n).to_vec();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_request_line_and_headers() {
        let raw = b"GET /foo?x=1 HTTP/1.1\r\nHost: example.com\r\nX-Test: a\r\nX-Test: b\r\n\r\n";
        let mut stream = &raw[..];
        let mut buf = BytesMut::new();
        let head = read_head(&mut stream, &mut buf).await.unwrap().unwrap();
        assert_eq!(head.line.method, "GET");
        assert_eq!(head.line.target, "/foo?x=1");
        assert_eq!(head.headers.get("host").unwrap(), "example.com");
        assert_eq!(head.headers.get("x-test").unwrap(), "b");
    }

    #[tokio::test]
    async fn rejects_malformed_request_line() {
        let raw = b"NOT A REQUEST\r\n\r\n";
        let mut stream = &raw[..];
        let mut buf = BytesMut::new();
        assert!(read_head(&mut stream, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn decodes_chunked_body_with_extensions_and_trailer() {
        let raw = b"5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: ignored\r\n\r\n";
        let mut stream = &raw[..];
        let mut leftover = BytesMut::new();
        let mut collected = Vec::new();
        read_chunked_body(&mut stream, &mut leftover, |chunk| {
            collected.extend_from_slice(chunk);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(collected, b"hello world");
    }
}
