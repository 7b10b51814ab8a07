//! WebDAV class-1 server layered over a Handler SDK server, serving one
//! upload directory (spec.md §4.10).
//!
//! Grounded on `webdav_handler.rs`'s method-dispatch table and
//! `webdav_adapter.rs`'s property model, generalized from OxiCloud's
//! database-backed folder/file entities to a direct filesystem tree the way
//! spec.md frames the WebDAV server: "over an upload directory".

pub mod methods;
pub mod xml;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration for one WebDAV mount, plus the five subclassing predicates
/// spec.md §3/§9 calls out (`shouldUpload`/`shouldMove`/`shouldCopy`/
/// `shouldDelete`/`shouldCreateDirectory`), each defaulting to `true`.
pub struct WebDavConfig {
    pub root: PathBuf,
    pub allow_hidden_items: bool,
    pub allowed_file_extensions: Option<HashSet<String>>,
    pub should_upload: bool,
    pub should_move: bool,
    pub should_copy: bool,
    pub should_delete: bool,
    pub should_create_directory: bool,
}

impl WebDavConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_hidden_items: false,
            allowed_file_extensions: None,
            should_upload: true,
            should_move: true,
            should_copy: true,
            should_delete: true,
            should_create_directory: true,
        }
    }

    /// Precomputed filtering predicate per spec.md §4.10: reject dotfiles
    /// unless `allow_hidden_items`, reject disallowed extensions on
    /// non-directories. Directories always pass.
    pub fn path_allowed(&self, rel_path: &str, is_directory: bool) -> bool {
        let leaf = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if leaf.is_empty() {
            return true;
        }
        if !self.allow_hidden_items && leaf.starts_with('.') {
            return false;
        }
        if is_directory {
            return true;
        }
        if let Some(allowed) = &self.allowed_file_extensions {
            let ext = Path::new(leaf)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            return allowed.contains(&ext);
        }
        true
    }

    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path.trim_start_matches('/'))
    }
}

/// True when `user_agent` identifies macOS Finder's `WebDAVFS` client or the
/// generic `WebDAVLib`, per spec.md §4.10's OPTIONS/LOCK gating.
pub fn is_finder_user_agent(user_agent: Option<&str>) -> bool {
    match user_agent {
        Some(ua) => ua.starts_with("WebDAVFS/") || ua.starts_with("WebDAVLib/"),
        None => false,
    }
}
