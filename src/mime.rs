//! Three-tier MIME type lookup, per spec.md §4.2's File Response contract:
//! caller overrides, then built-in overrides, then the system MIME registry,
//! defaulting to `application/octet-stream`.

use std::collections::HashMap;
use std::path::Path;

/// A small set of overrides applied before falling back to `mime_guess`.
/// `mime_guess`'s registry occasionally omits extensions that WebDAV clients
/// rely on (e.g. `.ico`, `.webmanifest`); keep this list short and only add
/// entries that were actually observed missing.
fn builtin_overrides(ext: &str) -> Option<&'static str> {
    match ext {
        "ico" => Some("image/x-icon"),
        "webmanifest" => Some("application/manifest+json"),
        "md" => Some("text/markdown; charset=utf-8"),
        _ => None,
    }
}

/// Resolves the content type for a path using the three-tier lookup.
///
/// `caller_overrides` maps a lowercase extension (no dot) to a content type
/// and takes priority over everything else, matching the "MIME-override
/// table" spec.md §4.2 allows a `Response::from_file` caller to supply.
pub fn lookup(path: &Path, caller_overrides: Option<&HashMap<String, String>>) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    if let Some(ext) = &ext {
        if let Some(map) = caller_overrides {
            if let Some(ct) = map.get(ext) {
                return ct.clone();
            }
        }
        if let Some(ct) = builtin_overrides(ext) {
            return ct.to_string();
        }
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// WebDAV collections (directories) always report this content type.
pub const DIRECTORY_CONTENT_TYPE: &str = "httpd/unix-directory";
