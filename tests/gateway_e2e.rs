//! End-to-end tests: gateway in front of a mock backend.

use std::net::SocketAddr;
use std::time::Duration;

use branching_router::config::parse_config;
use branching_router::{GatewayServer, Shutdown};

mod common;

/// Start the gateway for `branches_toml` in front of `backend`.
async fn start_gateway(backend: SocketAddr, branches_toml: &str) -> (SocketAddr, Shutdown) {
    let config = parse_config(&format!(
        "[upstream]\nurl = \"http://{backend}\"\n\n{branches_toml}"
    ))
    .unwrap();

    let server = GatewayServer::new(config).unwrap_or_else(|e| panic!("{e}"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

const BRANCHES: &str = r#"
[[branches]]
name = "beta"
condition = 'Header["X-Beta"] contains "1" or Query["beta"] contains "yes"'
chain = ["strip", "tag"]

[branches.middlewares.strip.strip_prefix]
prefixes = ["/beta"]

[branches.middlewares.tag.headers]
custom_request_headers = { X-Variant = "beta" }
custom_response_headers = { chain = "beta" }

[[branches]]
name = "legacy"
condition = 'Path matches "^/old/"'

[branches.middlewares.rewrite.replace_path]
path = "/new"
"#;

#[tokio::test]
async fn test_branch_rewrites_before_forwarding() {
    let backend = common::start_mock_backend().await;
    let (gateway, shutdown) = start_gateway(backend, BRANCHES).await;

    let res = client()
        .get(format!("http://{gateway}/beta/items?page=2"))
        .header("X-Beta", "1")
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["chain"], "beta");
    assert_eq!(res.headers()["x-backend"], "mock");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "GET /items?page=2 HTTP/1.1");

    shutdown.trigger();
}

#[tokio::test]
async fn test_default_path_reaches_upstream_untouched() {
    let backend = common::start_mock_backend().await;
    let (gateway, shutdown) = start_gateway(backend, BRANCHES).await;

    let res = client()
        .get(format!("http://{gateway}/beta/items"))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    assert!(res.headers().get("chain").is_none());
    assert_eq!(res.text().await.unwrap(), "GET /beta/items HTTP/1.1");

    shutdown.trigger();
}

#[tokio::test]
async fn test_second_branch_runs_after_first_declines() {
    let backend = common::start_mock_backend().await;
    let (gateway, shutdown) = start_gateway(backend, BRANCHES).await;

    let res = client()
        .get(format!("http://{gateway}/old/page"))
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.text().await.unwrap(), "GET /new HTTP/1.1");

    shutdown.trigger();
}

#[tokio::test]
async fn test_evaluation_error_still_serves_request() {
    let backend = common::start_mock_backend().await;
    let (gateway, shutdown) = start_gateway(
        backend,
        r#"
[[branches]]
name = "strict"
condition = 'Header["X-Count"][0] > 10'

[branches.middlewares.tag.headers]
custom_response_headers = { chain = "counted" }
"#,
    )
    .await;

    let client = client();

    let res = client
        .get(format!("http://{gateway}/"))
        .header("X-Count", "many")
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("chain").is_none());

    let res = client
        .get(format!("http://{gateway}/"))
        .header("X-Count", "11")
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.headers()["chain"], "counted");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = closed.local_addr().unwrap();
    drop(closed);

    let (gateway, shutdown) = start_gateway(backend, "").await;

    let res = client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 502);

    shutdown.trigger();
}
