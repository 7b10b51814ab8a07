//! Embeddable HTTP/1.1 server with a class-1 WebDAV server built on top
//! (spec.md §1). See `Server` for the entry point and `webdav` for the
//! WebDAV mount helper.

pub mod auth;
pub mod body;
pub mod conditional;
pub mod connection;
pub mod date;
pub mod error;
pub mod handler;
pub mod logging;
pub mod mime;
pub mod multipart;
pub mod percent;
pub mod request;
pub mod response;
pub mod server;
pub mod webdav;
pub mod wire;

pub use auth::{AuthConfig, AuthenticationMethod};
pub use body::BodyReader;
pub use connection::ConnectionHooks;
pub use error::{HttpError, WebletError};
pub use handler::{Handler, Process};
pub use logging::{default_sink, install_default_subscriber, LogLevel, LogSink, SharedLogSink, TracingSink};
pub use request::{Request, RequestKind};
pub use response::Response;
pub use server::{LifecycleHooks, Server, ServerHandle, ServerOptions};
pub use webdav::{is_finder_user_agent, WebDavConfig};

/// Registers the full WebDAV method set (spec.md §4.10) onto `server`,
/// serving `config.root`. All ten methods match any path; the method
/// implementations resolve the path against `config` themselves.
pub fn register_webdav(server: &mut Server, config: std::sync::Arc<webdav::WebDavConfig>) {
    use request::RequestKind;
    use webdav::methods;

    macro_rules! register {
        ($method:literal, $kind:expr, $f:path) => {{
            let cfg = config.clone();
            server.register(Handler::any_method($method, $kind, move |req: Request| {
                let cfg = cfg.clone();
                async move { $f(&req, &cfg).await }
            }));
        }};
    }

    register!("OPTIONS", RequestKind::Base, methods::options);
    register!("GET", RequestKind::Base, methods::get);
    register!("HEAD", RequestKind::Base, methods::get);
    register!("DELETE", RequestKind::Base, methods::delete);
    register!("MKCOL", RequestKind::Data, methods::mkcol);
    register!("COPY", RequestKind::Base, methods::copy);
    register!("MOVE", RequestKind::Base, methods::r#move);
    register!("PROPFIND", RequestKind::Data, methods::propfind);
    register!("LOCK", RequestKind::Data, methods::lock);
    register!("UNLOCK", RequestKind::Base, methods::unlock);

    let cfg = config.clone();
    server.register(Handler::any_method("PUT", RequestKind::File, move |req: Request| {
        let cfg = cfg.clone();
        async move { methods::put(req, &cfg).await }
    }));
}
