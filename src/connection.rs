//! Per-socket state machine (spec.md §4.5):
//!
//! ```text
//! IDLE -> READING_HEADERS -> MATCHING -> READING_BODY -> REWRITING -> PREFLIGHT
//!       -> PROCESSING -> OVERRIDING -> WRITING_HEADERS -> WRITING_BODY -> CLOSED
//! ```
//!
//! Grounded on the accept-loop/state-enum shape of
//! `examples/other_examples/75e79216_tomaka-rouille__src-socket_handler-http1.rs.rs`,
//! adapted from a single-threaded epoll loop to one tokio task per
//! connection, matching spec.md §5's "each accepted connection becomes an
//! independent task" model.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::AuthConfig;
use crate::conditional;
use crate::handler::Handler;
use crate::logging::{log_connection_summary, SharedLogSink};
use crate::percent;
use crate::request::{DataSink, DiscardSink, FileSink, MultipartSink, Request, RequestKind, UrlFormSink};
use crate::response::Response;
use crate::wire::parse::{read_chunked_body, read_head};
use crate::wire::range::parse_range_header;
use crate::wire::write::{write_chunk, write_head, write_status_only};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    ReadingHeaders,
    Matching,
    ReadingBody,
    Rewriting,
    Preflight,
    Processing,
    Overriding,
    WritingHeaders,
    WritingBody,
    Closed,
}

/// Subclassing hooks exposed as overridable function fields, per spec.md §9's
/// "expose as per-server overridable function fields (strategy pattern)".
/// Each defaults to the behavior spec.md §4.5 describes.
#[derive(Clone, Default)]
pub struct ConnectionHooks {
    /// May veto the connection before any bytes are read.
    pub open: Option<Arc<dyn Fn(SocketAddr) -> bool + Send + Sync>>,
    /// May substitute the effective path used for handler matching.
    pub rewrite_request_url: Option<Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

pub struct ConnectionContext {
    pub handlers: Arc<Vec<Handler>>,
    pub server_name: String,
    pub auth: Option<Arc<AuthConfig>>,
    pub automatically_map_head_to_get: bool,
    pub upload_dir: std::path::PathBuf,
    pub hooks: ConnectionHooks,
    pub log_sink: SharedLogSink,
}

/// Drives one accepted socket through the full state machine to completion.
#[allow(unused_assignments)]
pub async fn handle_connection(
    stream: TcpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
) {
    let mut state = ConnectionState::Idle;

    if let Some(open_hook) = &ctx.hooks.open {
        if !open_hook(remote_addr) {
            return;
        }
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::new();

    state = ConnectionState::ReadingHeaders;
    let head = match read_head(&mut reader, &mut buf).await {
        Ok(Some(h)) => h,
        Ok(None) => return,
        Err(_) => {
            abort(&mut writer, 400, &ctx, remote_addr, "-", "-").await;
            return;
        }
    };

    let (raw_path, query_str) = head.line.target.split_once('?').unwrap_or((&head.line.target, ""));
    let decoded_path = percent::decode_utf8_lossy(raw_path);
    let normalized_path = percent::normalize_path(&decoded_path);
    let query = parse_query(query_str);

    state = ConnectionState::Rewriting;
    let effective_path = match &ctx.hooks.rewrite_request_url {
        Some(f) => f(&normalized_path),
        None => normalized_path.clone(),
    };

    let original_method = head.line.method.clone();
    let match_method = if ctx.automatically_map_head_to_get && original_method == "HEAD" {
        "GET".to_string()
    } else {
        original_method.clone()
    };

    state = ConnectionState::Matching;
    let matched = ctx
        .handlers
        .iter()
        .rev()
        .find_map(|h| h.matches(&match_method, &effective_path).map(|caps| (h, caps)));

    let (handler, captures) = match matched {
        Some(pair) => pair,
        None => {
            abort(&mut writer, 501, &ctx, remote_addr, &original_method, &effective_path).await;
            return;
        }
    };

    let content_length = head.headers.get("content-length").and_then(|v| v.parse::<u64>().ok());
    let chunked = head
        .headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let uses_gzip = head
        .headers
        .get("accept-encoding")
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);
    let content_type = head.headers.get("content-type").cloned();
    let byte_range = head.headers.get("range").and_then(|v| parse_range_header(v));

    state = ConnectionState::ReadingBody;
    let body = match read_body_into_sink(
        &mut reader,
        &mut buf,
        handler.kind,
        content_length,
        chunked,
        content_type.as_deref(),
        &ctx.upload_dir,
    )
    .await
    {
        Ok(b) => b,
        Err(status) => {
            abort(&mut writer, status, &ctx, remote_addr, &original_method, &effective_path).await;
            return;
        }
    };

    let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
    if !captures.is_empty() {
        attributes.insert(crate::request::ATTR_REGEX_CAPTURES.to_string(), captures);
    }

    let request = Request {
        method: original_method,
        scheme: "http".to_string(),
        host: head.headers.get("host").cloned(),
        raw_path: raw_path.to_string(),
        path: effective_path,
        query,
        headers: head.headers,
        content_type,
        content_length,
        chunked,
        uses_gzip,
        attributes,
        byte_range,
        local_addr,
        remote_addr,
        body,
    };

    state = ConnectionState::Preflight;
    let preflight_response = preflight(&request, &ctx);
    let is_head = request.method == "HEAD";
    let override_method = request.method.clone();
    let log_path = request.raw_path.clone();
    let override_if_none_match = request.header("if-none-match").map(str::to_string);
    let override_if_modified_since = request.header("if-modified-since").map(str::to_string);

    let response = match preflight_response {
        Some(resp) => resp,
        None => {
            state = ConnectionState::Processing;
            match handler.call(request).await {
                Ok(resp) => resp,
                Err(err) => Response::from_error(&err),
            }
        }
    };

    state = ConnectionState::Overriding;
    let response = apply_override(
        &override_method,
        override_if_none_match.as_deref(),
        override_if_modified_since.as_deref(),
        response,
    );

    state = ConnectionState::WritingHeaders;
    let now = chrono::Utc::now();
    let response_status = response.status;
    if write_head(&mut writer, &response, &ctx.server_name, now).await.is_err() {
        return;
    }

    state = ConnectionState::WritingBody;
    if response.has_body() && !is_head {
        write_body(&mut writer, response).await;
    }

    let _ = writer.shutdown().await;
    state = ConnectionState::Closed;

    log_connection_summary(ctx.log_sink.as_ref(), remote_addr, &override_method, &log_path, response_status);
}

fn preflight(request: &Request, ctx: &ConnectionContext) -> Option<Response> {
    let auth = ctx.auth.as_ref()?;
    let authorized = request
        .header("authorization")
        .map(|header| auth.validate(header, &request.method, &request.raw_path))
        .unwrap_or(false);

    if authorized {
        return None;
    }

    Some(Response::empty(401).with_header("WWW-Authenticate", auth.challenge()))
}

/// `override` default: conditional-GET revalidation (spec.md §4.8). Takes
/// the request's method and conditional headers captured before the
/// `Request` was moved into the handler's `process` call, rather than the
/// `Request` itself.
fn apply_override(method: &str, if_none_match: Option<&str>, if_modified_since: Option<&str>, mut response: Response) -> Response {
    if let Some(status) = conditional::evaluate(method, if_none_match, if_modified_since, &response) {
        let etag = response.etag.clone();
        let last_modified = response.last_modified;
        let max_age = response.max_age;
        response = Response::empty(status);
        response.etag = etag;
        response.last_modified = last_modified;
        response.max_age = max_age;
    }
    response
}

async fn write_body<W: AsyncWrite + Unpin>(writer: &mut W, mut response: Response) {
    let chunked = response.content_length == Some(crate::response::CONTENT_LENGTH_UNKNOWN);
    if response.body.open().await.is_err() {
        return;
    }
    loop {
        let chunk = match response.body.read().await {
            Ok(c) => c,
            Err(_) => break,
        };
        if chunk.is_empty() {
            if chunked {
                let _ = write_chunk(writer, &[]).await;
            }
            break;
        }
        let result = if chunked {
            write_chunk(writer, &chunk).await
        } else {
            writer.write_all(&chunk).await
        };
        if result.is_err() {
            break;
        }
    }
    response.body.close().await;
}

async fn abort<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    ctx: &ConnectionContext,
    remote_addr: SocketAddr,
    method: &str,
    path: &str,
) {
    let _ = write_status_only(writer, status, &ctx.server_name, chrono::Utc::now()).await;
    let _ = writer.shutdown().await;
    log_connection_summary(ctx.log_sink.as_ref(), remote_addr, method, path, status);
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let k = percent::decode_utf8_lossy(&k.replace('+', " "));
        let v = percent::decode_utf8_lossy(&v.replace('+', " "));
        map.insert(k, v);
    }
    map
}

async fn read_body_into_sink<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
    kind: RequestKind,
    content_length: Option<u64>,
    chunked: bool,
    content_type: Option<&str>,
    upload_dir: &std::path::Path,
) -> Result<crate::request::RequestBody, u16> {
    use crate::request::BodySink;

    let mut sink: Box<dyn BodySink> = match kind {
        RequestKind::Base => Box::new(DiscardSink),
        RequestKind::Data => Box::new(DataSink::default()),
        RequestKind::File => Box::new(FileSink::new_in(upload_dir).map_err(|_| 500u16)?),
        RequestKind::UrlForm => Box::new(UrlFormSink::new(DataSink::DEFAULT_LIMIT)),
        RequestKind::Multipart => {
            let boundary = content_type
                .and_then(crate::multipart::extract_boundary)
                .ok_or(400u16)?
                .to_string();
            Box::new(MultipartSink::new(DataSink::DEFAULT_LIMIT, boundary, upload_dir.to_path_buf()))
        }
    };

    sink.open().await.map_err(|_| 500u16)?;

    if chunked {
        // `buf` still holds whatever bytes `read_head` over-read past
        // CRLFCRLF (raw chunk framing, not decoded body) — hand it to the
        // decoder as the leftover buffer rather than writing it to the sink.
        let mut decoded = Vec::new();
        read_chunked_body(reader, buf, |chunk| {
            decoded.extend_from_slice(chunk);
            Ok(())
        })
        .await
        .map_err(|_| 400u16)?;
        sink.write(&decoded).await.map_err(|e| e.status)?;
    } else if let Some(len) = content_length {
        let mut remaining = len;

        if !buf.is_empty() {
            let take = (buf.len() as u64).min(remaining) as usize;
            let leftover = buf.split_to(take);
            sink.write(&leftover).await.map_err(|e| e.status)?;
            remaining -= take as u64;
        }

        while remaining > 0 {
            let mut chunk = vec![0u8; remaining.min(32 * 1024) as usize];
            let n = reader.read(&mut chunk).await.map_err(|_| 400u16)?;
            if n == 0 {
                return Err(400);
            }
            sink.write(&chunk[..n]).await.map_err(|e| e.status)?;
            remaining -= n as u64;
        }
    }

    Box::new(sink).close().await.map_err(|e| e.status)
}
