//! Per-method WebDAV handlers (spec.md §4.10), dispatched over a
//! [`crate::Server`] the way `webdav_handler.rs` dispatches over a fixed
//! method switch — here generalized into individual [`crate::Handler`]
//! registrations so the rest of the Handler SDK (auth, conditional
//! override, gzip) still applies uniformly.

use std::path::Path;

use crate::conditional;
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;

use super::xml::{self, PropfindEntry, PropfindScope};
use super::{is_finder_user_agent, WebDavConfig};

fn depth_header(req: &Request) -> Option<&str> {
    req.header("depth")
}

/// `If-Match`/`If-Unmodified-Since` (spec.md §2's write-precondition
/// feature): stats `path`, computing its current `ETag`/`Last-Modified` when
/// it exists (`None`/`None` otherwise, so `If-Match` still correctly fails
/// against a missing resource), and aborts with 412 if the precondition
/// fails.
async fn check_write_preconditions(req: &Request, path: &Path) -> Result<(), HttpError> {
    let meta = tokio::fs::symlink_metadata(path).await.ok();
    let (etag, last_modified) = match &meta {
        Some(m) if m.is_file() => (
            Some(crate::response::file_etag(m)),
            m.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
        ),
        _ => (None, None),
    };
    if conditional::write_precondition_fails(req, etag.as_deref(), last_modified) {
        return Err(HttpError::precondition_failed("precondition failed"));
    }
    Ok(())
}

/// `OPTIONS`: `DAV: 1`, widened to `DAV: 1, 2` for Finder's `WebDAVFS`/
/// `WebDAVLib` user agents.
pub async fn options(req: &Request, _config: &WebDavConfig) -> Result<Response, HttpError> {
    let dav = if is_finder_user_agent(req.header("user-agent")) {
        "1, 2"
    } else {
        "1"
    };
    Ok(Response::empty(200)
        .with_header("DAV", dav)
        .with_header("Allow", "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE, PROPFIND, LOCK, UNLOCK"))
}

/// `GET`/`HEAD`: serves file contents (honoring `Range`), or an empty `200`
/// on directories — directory contents are never enumerated by GET.
pub async fn get(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    let rel_path = req.path.as_str();
    let path = config.resolve(rel_path);

    let meta = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|_| HttpError::not_found("resource not found"))?;

    if !config.path_allowed(rel_path, meta.is_dir()) {
        return Err(HttpError::not_found("resource not found"));
    }

    if meta.is_dir() {
        return Ok(Response::empty(200));
    }

    Response::from_file(&path, req.byte_range, None, None).await
}

/// `PUT`: rejects `Range`; requires the parent directory to exist; rejects
/// overwriting an existing directory; replaces an existing file (204) or
/// creates a new one (201), moving the staged temp file into place.
pub async fn put(mut req: Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    if req.byte_range.is_some() {
        return Err(HttpError::bad_request("Range is not supported on PUT"));
    }
    if !config.should_upload {
        return Err(HttpError::forbidden("uploads are disabled"));
    }

    let rel_path = req.path.clone();
    let dest = config.resolve(&rel_path);

    if !config.path_allowed(&rel_path, false) {
        return Err(HttpError::forbidden("path is not allowed"));
    }
    check_write_preconditions(&req, &dest).await?;

    let parent = dest.parent().ok_or_else(|| HttpError::conflict("invalid destination path"))?;
    if tokio::fs::metadata(parent).await.is_err() {
        return Err(HttpError::conflict("parent directory does not exist"));
    }

    let existing = tokio::fs::symlink_metadata(&dest).await.ok();
    if let Some(meta) = &existing {
        if meta.is_dir() {
            return Err(HttpError::method_not_allowed("destination is a directory"));
        }
    }

    let temp = req
        .take_temp_file()
        .ok_or_else(|| HttpError::internal("request body was not staged to a temp file"))?;

    temp.persist(&dest)
        .map_err(|e| HttpError::internal("failed to move upload into place").with_source(e))?;

    Ok(Response::empty(if existing.is_some() { 204 } else { 201 }))
}

/// `DELETE`: requires `Depth: infinity` or absent; recursively removes the
/// resource.
pub async fn delete(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    if !config.should_delete {
        return Err(HttpError::forbidden("deletion is disabled"));
    }
    if let Some(depth) = depth_header(req) {
        if !depth.eq_ignore_ascii_case("infinity") {
            return Err(HttpError::bad_request("DELETE requires Depth: infinity or absent"));
        }
    }

    let rel_path = req.path.as_str();
    let path = config.resolve(rel_path);
    let meta = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|_| HttpError::not_found("resource not found"))?;
    check_write_preconditions(req, &path).await?;

    if meta.is_dir() {
        tokio::fs::remove_dir_all(&path).await?;
    } else {
        tokio::fs::remove_file(&path).await?;
    }

    Ok(Response::empty(204))
}

/// `MKCOL`: rejects a non-empty body; requires the parent to exist; creates
/// exactly one new level.
pub async fn mkcol(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    if !config.should_create_directory {
        return Err(HttpError::forbidden("directory creation is disabled"));
    }
    if req.content_length.unwrap_or(0) > 0 || req.body_bytes().map(|b| !b.is_empty()).unwrap_or(false) {
        return Err(HttpError::unsupported_media_type("MKCOL does not accept a request body"));
    }

    let rel_path = req.path.as_str();
    let path = config.resolve(rel_path);
    check_write_preconditions(req, &path).await?;
    let parent = path.parent().ok_or_else(|| HttpError::conflict("invalid path"))?;
    if tokio::fs::metadata(parent).await.is_err() {
        return Err(HttpError::conflict("parent directory does not exist"));
    }

    tokio::fs::create_dir(&path).await?;
    Ok(Response::empty(201))
}

/// Strips a scheme+host prefix from a `Destination` header value using the
/// request's `Host` header as the delimiter, then percent-decodes it. A
/// `Destination` with no `scheme://` prefix is rejected (spec.md §9, open
/// question (b)): this server only accepts the absolute-URI form RFC 4918
/// requires.
fn parse_destination(destination: &str, host: Option<&str>) -> Option<String> {
    let after_scheme = destination.find("://").map(|idx| &destination[idx + 3..])?;
    let after_host = match host {
        Some(host) => after_scheme.strip_prefix(host).unwrap_or(after_scheme),
        None => after_scheme.find('/').map(|slash| &after_scheme[slash..]).unwrap_or(after_scheme),
    };
    let decoded = crate::percent::decode_utf8_lossy(after_host);
    Some(crate::percent::normalize_path(&decoded))
}

/// `Overwrite: T` allows replace, `Overwrite: F` forbids it; absent defaults
/// to allow for both COPY and MOVE (spec.md §4.10).
fn overwrite_allowed(req: &Request) -> bool {
    match req.header("overwrite") {
        Some(v) if v.eq_ignore_ascii_case("T") => true,
        Some(v) if v.eq_ignore_ascii_case("F") => false,
        _ => true,
    }
}

async fn copy_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(src).await?;
    if meta.is_dir() {
        tokio::fs::create_dir_all(dst).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let child_dst = dst.join(entry.file_name());
            Box::pin(copy_recursive(&entry.path(), &child_dst)).await?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, dst).await?;
    }
    Ok(())
}

/// `COPY`: requires `Depth` absent or `infinity`; default allows
/// overwriting an existing destination, same as `MOVE`.
pub async fn copy(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    if !config.should_copy {
        return Err(HttpError::forbidden("copy is disabled"));
    }
    if let Some(depth) = depth_header(req) {
        if !depth.eq_ignore_ascii_case("infinity") {
            return Err(HttpError::bad_request("COPY requires Depth: infinity or absent"));
        }
    }
    copy_or_move(req, config, false).await
}

/// `MOVE`: default allows overwriting an existing destination.
pub async fn r#move(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    if !config.should_move {
        return Err(HttpError::forbidden("move is disabled"));
    }
    copy_or_move(req, config, true).await
}

async fn copy_or_move(req: &Request, config: &WebDavConfig, is_move: bool) -> Result<Response, HttpError> {
    let destination_header = req
        .header("destination")
        .ok_or_else(|| HttpError::bad_request("missing Destination header"))?;
    let dest_rel = parse_destination(destination_header, req.header("host"))
        .ok_or_else(|| HttpError::bad_request("invalid Destination header"))?;

    let src_path = config.resolve(&req.path);
    let dest_path = config.resolve(&dest_rel);
    check_write_preconditions(req, &src_path).await?;

    let dest_parent = dest_path.parent().ok_or_else(|| HttpError::conflict("invalid destination"))?;
    if tokio::fs::metadata(dest_parent).await.is_err() {
        return Err(HttpError::conflict("destination parent does not exist"));
    }

    let overwrite = overwrite_allowed(req);
    let existing = tokio::fs::symlink_metadata(&dest_path).await.is_ok();
    if existing && !overwrite {
        return Err(HttpError::precondition_failed("destination exists and Overwrite is F"));
    }
    if existing {
        let dest_meta = tokio::fs::symlink_metadata(&dest_path).await?;
        if dest_meta.is_dir() {
            tokio::fs::remove_dir_all(&dest_path).await?;
        } else {
            tokio::fs::remove_file(&dest_path).await?;
        }
    }

    if is_move {
        tokio::fs::rename(&src_path, &dest_path).await?;
    } else {
        copy_recursive(&src_path, &dest_path).await?;
    }

    Ok(Response::empty(if existing { 204 } else { 201 }))
}

/// `PROPFIND`: accepts `Depth: 0` or `1` only; builds a `207 Multi-Status`
/// XML document, enumerating children in `str::cmp` order for `Depth: 1`.
pub async fn propfind(req: &Request, config: &WebDavConfig) -> Result<Response, HttpError> {
    let depth = req.header("depth").unwrap_or("0");
    if depth != "0" && depth != "1" {
        return Err(HttpError::bad_request("PROPFIND requires Depth: 0 or 1"));
    }

    let rel_path = req.path.as_str();
    let path = config.resolve(rel_path);
    let meta = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|_| HttpError::not_found("resource not found"))?;

    let scope = match req.body_bytes() {
        Some(bytes) => xml::parse_propfind_body(bytes),
        None => PropfindScope::AllProps,
    };

    let mut entries = vec![entry_for(rel_path, &path, &meta).await?];

    if depth == "1" && meta.is_dir() {
        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        while let Some(e) = read_dir.next_entry().await? {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        for name in names {
            let child_rel = format!("{}/{}", rel_path.trim_end_matches('/'), name);
            let child_path = path.join(&name);
            let child_meta = match tokio::fs::symlink_metadata(&child_path).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !config.path_allowed(&child_rel, child_meta.is_dir()) {
                continue;
            }
            entries.push(entry_for(&child_rel, &child_path, &child_meta).await?);
        }
    }

    let xml = xml::write_multistatus(&entries, &scope);
    Ok(Response::from_data("application/xml; charset=utf-8", xml.into_bytes()).with_status(207))
}

async fn entry_for(rel_path: &str, path: &Path, meta: &std::fs::Metadata) -> Result<PropfindEntry, HttpError> {
    let is_collection = meta.is_dir();
    let href = if is_collection && !rel_path.ends_with('/') {
        format!("{rel_path}/")
    } else {
        rel_path.to_string()
    };
    let _ = path;
    Ok(PropfindEntry {
        href,
        is_collection,
        content_length: if is_collection { None } else { Some(meta.len()) },
        last_modified: meta.modified().ok().map(chrono::DateTime::<chrono::Utc>::from),
        creation_date: meta.created().ok().map(chrono::DateTime::<chrono::Utc>::from),
    })
}

/// `LOCK`/`UNLOCK`: only served for the macOS Finder user agent; no lock
/// state is persisted. LOCK rejects anything other than
/// `exclusive`/`write`/`Depth: 0` with 403.
pub async fn lock(req: &Request, _config: &WebDavConfig) -> Result<Response, HttpError> {
    if !is_finder_user_agent(req.header("user-agent")) {
        return Err(HttpError::method_not_allowed("LOCK is only supported for Finder clients"));
    }
    if let Some(depth) = depth_header(req) {
        if depth != "0" {
            return Err(HttpError::forbidden("only Depth: 0 locks are supported"));
        }
    }

    let lock_request = match req.body_bytes() {
        Some(bytes) => xml::parse_lock_body(bytes),
        None => xml::parse_lock_body(b""),
    };
    if !lock_request.exclusive || !lock_request.write_lock {
        return Err(HttpError::forbidden("only exclusive write locks are supported"));
    }

    let token = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let body = xml::write_lockdiscovery(&token, lock_request.owner.as_deref());

    Ok(Response::from_data("application/xml; charset=utf-8", body.into_bytes())
        .with_header("Lock-Token", format!("<{token}>")))
}

pub async fn unlock(req: &Request, _config: &WebDavConfig) -> Result<Response, HttpError> {
    if !is_finder_user_agent(req.header("user-agent")) {
        return Err(HttpError::method_not_allowed("UNLOCK is only supported for Finder clients"));
    }
    if req.header("lock-token").map(str::is_empty).unwrap_or(true) {
        return Err(HttpError::bad_request("missing Lock-Token header"));
    }
    Ok(Response::empty(204))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;

    fn request(method: &str, path: &str, headers: HashMap<String, String>) -> Request {
        Request {
            method: method.to_string(),
            scheme: "http".to_string(),
            host: None,
            raw_path: path.to_string(),
            path: path.to_string(),
            query: HashMap::new(),
            headers,
            content_type: None,
            content_length: None,
            chunked: false,
            uses_gzip: false,
            attributes: HashMap::new(),
            byte_range: None,
            local_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            remote_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            body: crate::request::RequestBody::None,
        }
    }

    #[tokio::test]
    async fn options_reports_dav_1_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let req = request("OPTIONS", "/", HashMap::new());
        let resp = options(&req, &config).await.unwrap();
        assert_eq!(resp.extra_headers.get("DAV").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn options_reports_dav_2_for_finder() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), "WebDAVFS/3.0.0".to_string());
        let req = request("OPTIONS", "/", headers);
        let resp = options(&req, &config).await.unwrap();
        assert_eq!(resp.extra_headers.get("DAV").map(String::as_str), Some("1, 2"));
    }

    #[tokio::test]
    async fn get_on_directory_returns_empty_200() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let req = request("GET", "/", HashMap::new());
        let resp = get(&req, &config).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn mkcol_requires_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let req = request("MKCOL", "/missing-parent/child", HashMap::new());
        let err = mkcol(&req, &config).await.unwrap_err();
        assert_eq!(err.status, 409);
    }

    #[tokio::test]
    async fn mkcol_creates_one_level() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let req = request("MKCOL", "/newdir", HashMap::new());
        let resp = mkcol(&req, &config).await.unwrap();
        assert_eq!(resp.status, 201);
        assert!(tokio::fs::metadata(dir.path().join("newdir")).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn delete_rejects_non_infinity_depth() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.txt"), b"x").await.unwrap();
        let config = WebDavConfig::new(dir.path());
        let mut headers = HashMap::new();
        headers.insert("depth".to_string(), "0".to_string());
        let req = request("DELETE", "/f.txt", headers);
        let err = delete(&req, &config).await.unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn propfind_depth_1_lists_children_sorted() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"yy").await.unwrap();
        let config = WebDavConfig::new(dir.path());
        let mut headers = HashMap::new();
        headers.insert("depth".to_string(), "1".to_string());
        let req = request("PROPFIND", "/", headers);
        let resp = propfind(&req, &config).await.unwrap();
        assert_eq!(resp.status, 207);
    }

    #[tokio::test]
    async fn lock_rejected_for_non_finder_agent() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let req = request("LOCK", "/f.txt", HashMap::new());
        let err = lock(&req, &config).await.unwrap_err();
        assert_eq!(err.status, 405);
    }

    #[tokio::test]
    async fn lock_rejected_for_non_zero_depth() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebDavConfig::new(dir.path());
        let mut headers = HashMap::new();
        headers.insert("user-agent".to_string(), "WebDAVFS/3.0.0".to_string());
        headers.insert("depth".to_string(), "infinity".to_string());
        let req = request("LOCK", "/f.txt", headers);
        let err = lock(&req, &config).await.unwrap_err();
        assert_eq!(err.status, 403);
    }

    #[tokio::test]
    async fn copy_defaults_to_allowing_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"one").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"two").await.unwrap();
        let config = WebDavConfig::new(dir.path());
        let port = 0;
        let mut headers = HashMap::new();
        headers.insert("host".to_string(), format!("127.0.0.1:{port}"));
        headers.insert("destination".to_string(), format!("http://127.0.0.1:{port}/b.txt"));
        let req = request("COPY", "/a.txt", headers);
        let resp = copy(&req, &config).await.unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(tokio::fs::read(dir.path().join("b.txt")).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn put_rejects_if_match_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"old").await.unwrap();
        let config = WebDavConfig::new(dir.path());
        let mut headers = HashMap::new();
        headers.insert("if-match".to_string(), "\"does-not-match\"".to_string());
        let mut req = request("PUT", "/a.txt", headers);
        req.content_length = Some(3);
        let err = put(req, &config).await.unwrap_err();
        assert_eq!(err.status, 412);
    }

    #[test]
    fn destination_strips_host_prefix() {
        let dest = parse_destination("http://example.com/a/b%20c", Some("example.com")).unwrap();
        assert_eq!(dest, "/a/b c");
    }
}
