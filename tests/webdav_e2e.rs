//! End-to-end scenarios over a real socket (spec.md §8, scenarios A-F),
//! driven the way `server.rs`'s own `binds_ephemeral_port_and_serves_a_request`
//! test drives a raw `TcpStream` against a running `Server`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use weblet::{register_webdav, AuthenticationMethod, Server, ServerOptions, WebDavConfig};

async fn send(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

async fn send_bytes(port: u16, head: &str, body: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

async fn start_webdav_server(root: &std::path::Path) -> weblet::ServerHandle {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    let config = Arc::new(WebDavConfig::new(root));
    register_webdav(&mut server, config);
    server.start(root.to_path_buf()).await.unwrap()
}

#[tokio::test]
async fn scenario_a_options_dav_header_varies_by_user_agent() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_webdav_server(dir.path()).await;

    let curl = send(handle.port(), "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: curl/8.0\r\n\r\n").await;
    assert!(curl.starts_with("HTTP/1.1 200"));
    assert!(curl.contains("DAV: 1\r\n"));

    let finder = send(
        handle.port(),
        "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: WebDAVFS/3.0.0\r\n\r\n",
    )
    .await;
    assert!(finder.contains("DAV: 1, 2\r\n"));

    handle.stop().await;
}

#[tokio::test]
async fn scenario_b_put_then_get_round_trips_bytes() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::create_dir(dir.path().join("notes")).await.unwrap();
    let handle = start_webdav_server(dir.path()).await;

    let body = b"hello\n";
    let head = format!(
        "PUT /notes/a.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let put_response = send_bytes(handle.port(), &head, body).await;
    assert!(put_response.starts_with("HTTP/1.1 201"));

    let on_disk = tokio::fs::read(dir.path().join("notes/a.txt")).await.unwrap();
    assert_eq!(on_disk, body);

    let get_response = send(handle.port(), "GET /notes/a.txt HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(get_response.starts_with("HTTP/1.1 200"));
    assert!(get_response.contains("Content-Length: 6\r\n"));
    assert!(get_response.ends_with("hello\n"));

    handle.stop().await;
}

#[tokio::test]
async fn scenario_c_propfind_depth_one_lists_children() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("b.txt"), b"hello").await.unwrap();
    tokio::fs::create_dir(dir.path().join("c")).await.unwrap();
    let handle = start_webdav_server(dir.path()).await;

    let response = send(
        handle.port(),
        "PROPFIND / HTTP/1.1\r\nHost: localhost\r\nDepth: 1\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 207"));
    assert!(response.contains("<D:collection/>"));
    assert!(response.contains("<D:getcontentlength>5</D:getcontentlength>"));

    handle.stop().await;
}

#[tokio::test]
async fn scenario_d_range_request_returns_partial_content() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("big.bin"), vec![7u8; 1000]).await.unwrap();
    let handle = start_webdav_server(dir.path()).await;

    let response = send(
        handle.port(),
        "GET /big.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-99\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 206"));
    assert!(response.contains("Content-Range: bytes 0-99/1000\r\n"));
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    assert!(head.contains("Content-Length: 100\r\n"));
    assert_eq!(body.len(), 100);

    handle.stop().await;
}

#[tokio::test]
async fn scenario_e_move_renames_and_leaves_only_destination() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("x.txt"), b"content").await.unwrap();
    let handle = start_webdav_server(dir.path()).await;

    let request = format!(
        "MOVE /x.txt HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nDestination: http://127.0.0.1:{}/y.txt\r\n\r\n",
        handle.port(),
        handle.port()
    );
    let response = send(handle.port(), &request).await;
    assert!(response.starts_with("HTTP/1.1 201"));

    assert!(tokio::fs::metadata(dir.path().join("y.txt")).await.is_ok());
    assert!(tokio::fs::metadata(dir.path().join("x.txt")).await.is_err());

    handle.stop().await;
}

#[tokio::test]
async fn scenario_f_basic_auth_rejects_then_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let mut accounts = std::collections::HashMap::new();
    accounts.insert("alice".to_string(), "wonderland".to_string());

    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        authentication_method: Some(AuthenticationMethod::Basic),
        authentication_accounts: accounts,
        ..ServerOptions::default()
    });
    let config = Arc::new(WebDavConfig::new(dir.path()));
    register_webdav(&mut server, config);
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let unauthorized = send(handle.port(), "GET /protected HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(unauthorized.starts_with("HTTP/1.1 401"));
    assert!(unauthorized.contains("WWW-Authenticate: Basic realm=\"weblet\"\r\n"));

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    let credentials = BASE64.encode("alice:wonderland");
    let authorized = send(
        handle.port(),
        &format!("GET /protected HTTP/1.1\r\nHost: localhost\r\nAuthorization: Basic {credentials}\r\n\r\n"),
    )
    .await;
    assert!(authorized.starts_with("HTTP/1.1 404"));

    handle.stop().await;
}
