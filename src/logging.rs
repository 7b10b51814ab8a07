//! Pluggable logging sink (spec.md §1, §9: "a global logging facility
//! becomes a pluggable sink value; default writes to the process standard
//! error").

use std::sync::Arc;

/// Severity levels a [`LogSink`] receives. Mirrors `tracing`'s levels so the
/// default sink can forward one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A process-wide, internally-serialized logging sink. The default
/// implementation below forwards to `tracing`, matching the `tracing`
/// density already used throughout `file_system_utils.rs`/
/// `file_upload_service.rs` in the teacher.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards every message to the ambient `tracing` subscriber.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self
    }
}

/// Installs a process-wide `tracing` subscriber reading `RUST_LOG`,
/// defaulting to `info` when unset. Safe to call more than once; later
/// calls are no-ops.
pub fn install_default_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub type SharedLogSink = Arc<dyn LogSink>;

pub fn default_sink() -> SharedLogSink {
    Arc::new(TracingSink)
}

/// One-line connection summary emitted by the default `close()` hook
/// (spec.md §4.5: "default logs a single-line verbose summary").
pub fn log_connection_summary(sink: &dyn LogSink, remote: std::net::SocketAddr, method: &str, path: &str, status: u16) {
    sink.log(
        LogLevel::Info,
        &format!("{remote} \"{method} {path}\" {status}"),
    );
}
