//! Error taxonomy for the server.
//!
//! Two layers, mirroring the teacher's `FileServiceError` / `DomainError`
//! split: narrow per-concern errors convert with `From` into the single
//! [`HttpError`] that a handler or method implementation returns, and
//! [`WebletError`] covers configuration/startup failures that never reach
//! the wire.

use std::fmt;

/// Errors that can occur configuring or starting a [`crate::Server`].
#[derive(Debug, thiserror::Error)]
pub enum WebletError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("handler list cannot be modified while the server is running")]
    MutationWhileRunning,

    #[error("server is already running")]
    AlreadyRunning,

    #[error("invalid server option: {0}")]
    InvalidOption(String),
}

/// A per-request failure that renders as the minimal HTML error page
/// described in spec.md §7: title "HTTP Error N" plus the formatted message
/// and an optional underlying-error line.
#[derive(Debug)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    pub underlying: Option<String>,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            underlying: None,
        }
    }

    pub fn with_source(mut self, source: impl fmt::Display) -> Self {
        self.underlying = Some(source.to_string());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(405, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(415, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(412, message)
    }

    pub fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self::new(416, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(501, message)
    }

    /// Render the standard minimal HTML error page body.
    pub fn render_html(&self) -> String {
        let mut body = format!(
            "<!DOCTYPE html><html><head><title>HTTP Error {}</title></head><body><h1>HTTP Error {}</h1><p>{}</p>",
            self.status,
            self.status,
            html_escape(&self.message)
        );
        if let Some(underlying) = &self.underlying {
            body.push_str(&format!("<p>{}</p>", html_escape(underlying)));
        }
        body.push_str("</body></html>");
        body
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP Error {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let status = match err.kind() {
            NotFound => 404,
            PermissionDenied => 403,
            AlreadyExists => 409,
            _ => 500,
        };
        HttpError::new(status, "filesystem operation failed").with_source(err)
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
