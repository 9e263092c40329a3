//! Integration tests for HTTP retry behavior against a scripted local server

use clearance_harvester::config::HarvesterConfig;
use clearance_harvester::fetcher::http::SallingHttpClient;
use clearance_harvester::fetcher::FetchError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned HTTP/1.1 response per connection, in order, counting the
/// requests actually received. `connection: close` on every response keeps
/// the client from reusing sockets between attempts.
async fn spawn_scripted_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);

            // Drain the request head before answering
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                match socket.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), hits)
}

fn rate_limited(retry_after_secs: u64) -> String {
    format!(
        "HTTP/1.1 429 Too Many Requests\r\n\
         retry-after: {retry_after_secs}\r\n\
         content-length: 0\r\n\
         connection: close\r\n\r\n"
    )
}

fn ok_json(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    )
}

fn fast_config(base: &str) -> HarvesterConfig {
    let mut config = HarvesterConfig::new("test-token").with_api_base(base);
    // Keep the test quick; the backoff schedule itself is unit-tested
    config.initial_backoff = Duration::from_millis(5);
    config
}

#[tokio::test]
async fn test_three_429s_then_200_returns_payload() {
    let script = vec![
        rate_limited(0),
        rate_limited(0),
        rate_limited(0),
        ok_json(r#"{"ok":true}"#),
    ];
    let (base, hits) = spawn_scripted_server(script).await;

    let client = SallingHttpClient::new(&fast_config(&base)).unwrap();
    let body: serde_json::Value = client
        .get(&format!("{base}/v1/food-waste/"), &[])
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_429_through_every_attempt_surfaces_rate_limited() {
    let script = vec![rate_limited(0); 5];
    let (base, hits) = spawn_scripted_server(script).await;

    let result: Result<serde_json::Value, _> = SallingHttpClient::new(&fast_config(&base))
        .unwrap()
        .get(&format!("{base}/v1/food-waste/"), &[])
        .await;

    assert!(matches!(
        result,
        Err(FetchError::RateLimited { attempts: 5 })
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_client_error_fails_immediately() {
    let script = vec![
        "HTTP/1.1 401 Unauthorized\r\n\
         content-length: 12\r\n\
         connection: close\r\n\r\nbad token :("
            .to_string(),
        ok_json("{}"),
    ];
    let (base, hits) = spawn_scripted_server(script).await;

    let result: Result<serde_json::Value, _> = SallingHttpClient::new(&fast_config(&base))
        .unwrap()
        .get(&format!("{base}/v2/stores"), &[])
        .await;

    match result {
        Err(FetchError::ClientError { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad token :(");
        }
        other => panic!("expected ClientError, got {other:?}"),
    }
    // No second request was made
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_5xx_retried_then_succeeds() {
    let script = vec![
        "HTTP/1.1 503 Service Unavailable\r\n\
         content-length: 0\r\n\
         connection: close\r\n\r\n"
            .to_string(),
        ok_json(r#"[{"id":"s1","name":"Netto"}]"#),
    ];
    let (base, hits) = spawn_scripted_server(script).await;

    let body: serde_json::Value = SallingHttpClient::new(&fast_config(&base))
        .unwrap()
        .get(&format!("{base}/v2/stores"), &[])
        .await
        .unwrap();

    assert_eq!(body[0]["id"], "s1");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
