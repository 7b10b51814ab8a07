//! Wire-level integration tests: chunked transfer encoding, conditional GET,
//! and the generic Handler SDK, independent of the WebDAV method set.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use weblet::request::RequestKind;
use weblet::{Handler, Response, Server, ServerOptions};

async fn send_raw(port: u16, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn chunked_request_body_is_fully_decoded() {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    server.register(Handler::any_method("POST", RequestKind::Data, |req: weblet::Request| async move {
        let body = req.body_bytes().cloned().unwrap_or_default();
        Ok(Response::from_data("text/plain", body.to_vec()))
    }));
    let dir = tempfile::tempdir().unwrap();
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let request = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let response = send_raw(handle.port(), request).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("hello world"));

    handle.stop().await;
}

#[tokio::test]
async fn conditional_get_returns_304_on_matching_etag() {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    server.register(Handler::any_method("GET", RequestKind::Base, |_req: weblet::Request| async {
        Ok(Response::from_data("text/plain", b"fixed content".to_vec()).with_etag("fixed-etag"))
    }));
    let dir = tempfile::tempdir().unwrap();
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let first = send_raw(handle.port(), b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(first.starts_with("HTTP/1.1 200"));
    assert!(first.contains("ETag: \"fixed-etag\"\r\n"));

    let second = send_raw(
        handle.port(),
        b"GET / HTTP/1.1\r\nHost: localhost\r\nIf-None-Match: \"fixed-etag\"\r\n\r\n",
    )
    .await;
    assert!(second.starts_with("HTTP/1.1 304"));
    assert!(second.contains("ETag: \"fixed-etag\"\r\n"));

    handle.stop().await;
}

#[tokio::test]
async fn regex_handler_receives_capture_groups() {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    server.register(
        Handler::regex("GET", "/users/([0-9]+)", RequestKind::Base, |req: weblet::Request| async move {
            let id = req.captures().first().cloned().unwrap_or_default();
            Ok(Response::from_data("text/plain", id.into_bytes()))
        })
        .unwrap(),
    );
    let dir = tempfile::tempdir().unwrap();
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let response = send_raw(handle.port(), b"GET /users/42 HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("42"));

    handle.stop().await;
}

#[tokio::test]
async fn gzip_response_uses_chunked_framing() {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    server.register(Handler::any_method("GET", RequestKind::Base, |_req: weblet::Request| async {
        Ok(Response::from_data("text/plain", vec![b'a'; 4096]).with_gzip())
    }));
    let dir = tempfile::tempdir().unwrap();
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let response = send_raw(handle.port(), b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("Transfer-Encoding: chunked\r\n"));
    assert!(response.contains("Content-Encoding: gzip\r\n"));

    handle.stop().await;
}

#[tokio::test]
async fn head_request_never_writes_a_body() {
    let mut server = Server::new(ServerOptions {
        bind_to_localhost: true,
        ..ServerOptions::default()
    });
    server.register(Handler::any_method("GET", RequestKind::Base, |_req: weblet::Request| async {
        Ok(Response::from_data("text/plain", b"should not appear".to_vec()))
    }));
    let dir = tempfile::tempdir().unwrap();
    let handle = server.start(dir.path().to_path_buf()).await.unwrap();

    let response = send_raw(handle.port(), b"HEAD / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("Content-Length: 18\r\n"));
    assert!(!response.contains("should not appear"));

    handle.stop().await;
}
