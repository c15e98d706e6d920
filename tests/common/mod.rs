//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use branching_router::{handler_fn, BoxHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Terminal handler answering `200 OK` with `chain: default`.
#[allow(dead_code)]
pub fn default_handler() -> BoxHandler {
    handler_fn(|_req: Request<Body>| async {
        Response::builder()
            .header("chain", "default")
            .body(Body::from("default"))
            .unwrap()
    })
}

/// Start a mock backend on an ephemeral port. Each response body is the
/// request line it received, so tests can see the forwarded path.
#[allow(dead_code)]
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]);
                        let request_line = head.lines().next().unwrap_or("").to_string();

                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nX-Backend: mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            request_line.len(),
                            request_line
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
