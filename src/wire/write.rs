//! Status-line/header writer and chunked transfer-encoding body writer, per
//! spec.md §4.4.
//!
//! Grounded on the headers-then-body write loop in
//! `examples/other_examples/8178406d_mu2019-async-h1__src-server.rs.rs`.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::date::format_rfc1123;
use crate::response::{Response, CONTENT_LENGTH_UNKNOWN};

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        423 => "Locked",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// Writes the status-line and mandatory headers (`Connection: Close`,
/// `Server`, `Date`, plus the response's own headers) for a response with a
/// body. Returns whether the body must be chunk-framed.
pub async fn write_head<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: &Response,
    server_name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> io::Result<bool> {
    let mut out = String::new();
    out.push_str(&format!(
        "HTTP/1.1 {} {}\r\n",
        resp.status,
        reason_phrase(resp.status)
    ));
    out.push_str("Connection: Close\r\n");
    out.push_str(&format!("Server: {}\r\n", server_name));
    out.push_str(&format!("Date: {}\r\n", format_rfc1123(now)));

    let chunked = resp.has_body() && resp.content_length == Some(CONTENT_LENGTH_UNKNOWN);

    if let Some(ct) = &resp.content_type {
        out.push_str(&format!("Content-Type: {}\r\n", ct));
        if chunked {
            out.push_str("Transfer-Encoding: chunked\r\n");
        } else if let Some(len) = resp.content_length {
            out.push_str(&format!("Content-Length: {}\r\n", len));
        } else {
            out.push_str("Content-Length: 0\r\n");
        }
    } else {
        out.push_str("Content-Length: 0\r\n");
    }

    // Cache-Control/ETag/Last-Modified are validators, not body framing — a
    // bodiless response (e.g. a 304 from `override`) still carries them.
    out.push_str(&format!("Cache-Control: {}\r\n", resp.cache_control_value()));
    if let Some(lm) = resp.last_modified_header() {
        out.push_str(&format!("Last-Modified: {}\r\n", lm));
    }
    if let Some(etag) = &resp.etag {
        out.push_str(&format!("ETag: \"{}\"\r\n", etag));
    }

    for (name, value) in &resp.extra_headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");

    writer.write_all(out.as_bytes()).await?;
    Ok(chunked)
}

/// Writes an abort/status-line-only response: the mandatory headers, no
/// body, per spec.md §4.5's `abort` behavior.
pub async fn write_status_only<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    server_name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> io::Result<()> {
    let out = format!(
        "HTTP/1.1 {} {}\r\nConnection: Close\r\nServer: {}\r\nDate: {}\r\nContent-Length: 0\r\n\r\n",
        status,
        reason_phrase(status),
        server_name,
        format_rfc1123(now),
    );
    writer.write_all(out.as_bytes()).await
}

/// Writes one chunk in `Transfer-Encoding: chunked` framing. A zero-length
/// chunk is the terminator with no trailer.
pub async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
    if data.is_empty() {
        writer.write_all(b"\r\n").await?;
    } else {
        writer.write_all(data).await?;
        writer.write_all(b"\r\n").await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;

    #[tokio::test]
    async fn writes_chunked_framing_when_length_unknown() {
        let mut resp = Response::from_data("text/plain", b"x".to_vec());
        resp.content_length = Some(CONTENT_LENGTH_UNKNOWN);
        let mut out = Vec::new();
        let chunked = write_head(&mut out, &resp, "test", chrono::Utc::now()).await.unwrap();
        assert!(chunked);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked"));
        assert!(!text.contains("Content-Length:"));
    }

    #[tokio::test]
    async fn writes_fixed_length_framing() {
        let resp = Response::from_data("text/plain", b"hello".to_vec());
        let mut out = Vec::new();
        let chunked = write_head(&mut out, &resp, "test", chrono::Utc::now()).await.unwrap();
        assert!(!chunked);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5"));
    }

    #[tokio::test]
    async fn chunk_round_trip_bytes() {
        let mut out = Vec::new();
        write_chunk(&mut out, b"hello").await.unwrap();
        write_chunk(&mut out, b"").await.unwrap();
        assert_eq!(out, b"5\r\nhello\r\n0\r\n\r\n".to_vec());
    }
}
