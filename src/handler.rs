//! Handler SDK: method/path/regex matching, default-HEAD-to-GET rewriting,
//! and static GET helpers (spec.md §4.7).
//!
//! Grounded on the router-registration shape of
//! `application/services` + `interfaces/api/handlers/webdav_handler.rs`'s
//! method-dispatch table, generalized from a fixed WebDAV switch into an
//! open, ordered handler list the way spec.md's Handler SDK requires.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::error::HttpError;
use crate::mime;
use crate::request::{Request, RequestKind};
use crate::response::Response;

/// Invoked after the body is fully read; must resolve to a `Response` or an
/// `HttpError` that the Connection maps to the wire (spec.md §4, "Handler").
#[async_trait]
pub trait Process: Send + Sync {
    async fn call(&self, req: Request) -> Result<Response, HttpError>;
}

#[async_trait]
impl<F, Fut> Process for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Response, HttpError>> + Send + 'static,
{
    async fn call(&self, req: Request) -> Result<Response, HttpError> {
        (self)(req).await
    }
}

enum Matcher {
    Method(String),
    ExactPath { method: String, path: String },
    Regex { method: String, pattern: Regex },
}

impl Matcher {
    fn matches(&self, method: &str, path: &str) -> Option<Vec<String>> {
        match self {
            Matcher::Method(m) => (m == method).then(Vec::new),
            Matcher::ExactPath { method: m, path: p } => {
                (m == method && p.eq_ignore_ascii_case(path)).then(Vec::new)
            }
            Matcher::Regex { method: m, pattern } => {
                if m != method {
                    return None;
                }
                pattern.captures(path).map(|caps| {
                    caps.iter()
                        .skip(1)
                        .map(|c| c.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect()
                })
            }
        }
    }
}

/// A registered `(matchPredicate, asyncProcess)` pair with its declared
/// Request variant.
pub struct Handler {
    matcher: Matcher,
    pub kind: RequestKind,
    process: Arc<dyn Process>,
}

impl Handler {
    pub fn any_method(method: impl Into<String>, kind: RequestKind, process: impl Process + 'static) -> Self {
        Self {
            matcher: Matcher::Method(method.into()),
            kind,
            process: Arc::new(process),
        }
    }

    pub fn exact_path(method: impl Into<String>, path: impl Into<String>, kind: RequestKind, process: impl Process + 'static) -> Self {
        Self {
            matcher: Matcher::ExactPath {
                method: method.into(),
                path: path.into(),
            },
            kind,
            process: Arc::new(process),
        }
    }

    /// `pattern` is matched case-insensitively. Per DESIGN.md's Open
    /// Question decision, the full decoded path is matched (anchored at
    /// both ends) unless the caller's pattern already begins with `^`.
    pub fn regex(method: impl Into<String>, pattern: &str, kind: RequestKind, process: impl Process + 'static) -> Result<Self, regex::Error> {
        let anchored = if pattern.starts_with('^') {
            format!("(?i){pattern}")
        } else {
            format!("(?i)^{pattern}$")
        };
        Ok(Self {
            matcher: Matcher::Regex {
                method: method.into(),
                pattern: Regex::new(&anchored)?,
            },
            kind,
            process: Arc::new(process),
        })
    }

    pub(crate) fn matches(&self, method: &str, path: &str) -> Option<Vec<String>> {
        self.matcher.matches(method, path)
    }

    pub(crate) async fn call(&self, req: Request) -> Result<Response, HttpError> {
        self.process.call(req).await
    }
}

/// Serves a directory listing or a named index file for GET requests under
/// `root`, matching the static-GET "serve a directory" helper in spec.md
/// §4.7. `index_filename`, when set and present, is served instead of a
/// generated index.
pub async fn serve_directory(
    root: &Path,
    rel_path: &str,
    index_filename: Option<&str>,
) -> Result<Response, HttpError> {
    let dir = root.join(rel_path.trim_start_matches('/'));

    if let Some(index) = index_filename {
        let index_path = dir.join(index);
        if tokio::fs::metadata(&index_path).await.is_ok() {
            return Response::from_file(&index_path, None, None, None).await;
        }
    }

    generate_index(&dir, rel_path).await
}

/// Generates a minimal HTML directory index, entries sorted in deterministic
/// (plain codepoint) order per DESIGN.md's Open Question decision.
async fn generate_index(dir: &Path, rel_path: &str) -> Result<Response, HttpError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| HttpError::not_found("directory not found"))?;
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| HttpError::internal("failed reading directory").with_source(e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push((name, is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut html = String::from("<!DOCTYPE html>\n<html><body><ul>\n");
    for (name, is_dir) in &entries {
        let display = if *is_dir { format!("{name}/") } else { name.clone() };
        let href = crate::percent::escape_href_segment(&display);
        html.push_str(&format!("<li><a href=\"{href}\">{display}</a></li>\n"));
    }
    html.push_str("</ul></body></html>\n");
    let _ = rel_path;

    Ok(Response::from_data("text/html; charset=utf-8", html.into_bytes()))
}

/// Serves a single static file by absolute path, with optional byte range
/// and attachment disposition.
pub async fn serve_file(
    path: &Path,
    range: Option<(u64, u64)>,
    attachment_filename: Option<&str>,
) -> Result<Response, HttpError> {
    Response::from_file(path, range, None, attachment_filename).await
}

/// Serves a fixed in-memory byte blob.
pub fn serve_bytes(content_type: &str, data: Vec<u8>) -> Response {
    Response::from_data(content_type, data)
}

pub fn mime_for(path: &Path) -> String {
    mime::lookup(path, None)
}

pub fn join_upload_path(root: &Path, rel_path: &str) -> PathBuf {
    root.join(rel_path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_sorted_index() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"").await.unwrap();
        tokio::fs::create_dir(dir.path().join("c")).await.unwrap();

        let resp = serve_directory(dir.path(), "/", None).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn regex_handler_anchors_full_path_by_default() {
        let h = Handler::regex("GET", "/files/(.+)", RequestKind::Base, |_req: Request| async {
            Ok(Response::empty(200))
        })
        .unwrap();
        assert!(h.matches("GET", "/files/a.txt").is_some());
        assert!(h.matches("GET", "/other/files/a.txt").is_none());
    }

    #[test]
    fn regex_handler_captures_groups() {
        let h = Handler::regex("GET", "/users/([0-9]+)", RequestKind::Base, |_req: Request| async {
            Ok(Response::empty(200))
        })
        .unwrap();
        let captures = h.matches("GET", "/users/42").unwrap();
        assert_eq!(captures, vec!["42".to_string()]);
    }
}
