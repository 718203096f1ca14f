// Relay endpoint tests against a mock upstream
// Author: kelexine (https://github.com/kelexine)

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chat_relay::config::{ApiKey, AppConfig};
use chat_relay::server::create_router;
use chat_relay::upstream::CompletionClient;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const CHAT_BODY: &str = r#"{"messages":[{"role":"user","content":"Draft a follow-up for lead 17"}]}"#;

fn app(base_url: &str, api_key: Option<&str>) -> Router {
    app_with_shutdown(base_url, api_key, CancellationToken::new())
}

fn app_with_shutdown(base_url: &str, api_key: Option<&str>, shutdown: CancellationToken) -> Router {
    let mut config = AppConfig::default();
    config.upstream.api_base_url = base_url.to_string();
    config.upstream.api_key = api_key.map(ApiKey::new);
    let client = CompletionClient::new(&config.upstream).unwrap();
    create_router(config, client, shutdown).unwrap()
}

fn chat_request(method: Method, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_other_methods_rejected_with_405() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/responses").expect(0).create_async().await;
    let app = app(&server.url(), Some("sk-test"));

    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let response = app.clone().oneshot(chat_request(method.clone(), CHAT_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert_eq!(response.headers()[header::ALLOW], "POST, OPTIONS");
        assert!(body_json(response).await["error"].is_string());
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_preflight_returns_204_without_configuration() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/responses").expect(0).create_async().await;
    let app = app(&server.url(), None);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/chat")
        .header(header::ORIGIN, "https://crm.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    assert!(body_bytes(response).await.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_or_missing_messages_rejected_without_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/responses").expect(0).create_async().await;
    let app = app(&server.url(), Some("sk-test"));

    for body in [r#"{"messages":[]}"#, r#"{"toolChoice":"auto"}"#, "not json", ""] {
        let response = app.clone().oneshot(chat_request(Method::POST, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
        assert!(body_json(response).await["error"].is_string());
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_repeated_validation_failures_never_reach_upstream() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/responses").expect(0).create_async().await;
    let app = app(&server.url(), Some("sk-test"));

    for _ in 0..25 {
        let response = app
            .clone()
            .oneshot(chat_request(Method::POST, r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_credential_returns_500_without_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/responses").expect(0).create_async().await;
    let app = app(&server.url(), None);

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("API key"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_successful_stream_is_relayed_byte_for_byte() {
    let upstream_body = concat!(
        "event: response.created\n",
        "data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\"}}\n\n",
        "event: response.output_text.delta\n",
        "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi \\u00e9\"}\n\n",
        "event: response.completed\n",
        "data: {\"type\":\"response.completed\"}\n\n",
    );

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .match_header("authorization", "Bearer sk-test")
        .match_body(mockito::Matcher::PartialJson(json!({
            "input": [{"role": "user", "content": "Draft a follow-up for lead 17"}],
            "stream": true
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(upstream_body)
        .expect(1)
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-transform");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers.contains_key("x-request-id"));

    assert_eq!(body_bytes(response).await, upstream_body.as_bytes());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chunked_stream_is_relayed_in_order() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/responses")
        .with_status(200)
        .with_chunked_body(|w| {
            for i in 0..20 {
                write!(w, "data: {{\"seq\":{}}}\n\n", i)?;
            }
            Ok(())
        })
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected: String = (0..20).map(|i| format!("data: {{\"seq\":{}}}\n\n", i)).collect();
    assert_eq!(body_bytes(response).await, expected.as_bytes());
}

#[tokio::test]
async fn test_upstream_rate_limit_surfaces_status_and_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .with_status(429)
        .with_body("rate limited")
        .expect(1)
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("429"), "{}", error);
    assert!(error.contains("rate limited"), "{}", error);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_upstream_json_error_message_is_extracted() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/responses")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"Unsupported parameter: 'tool_choice'","type":"invalid_request_error"}}"#)
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    // Upstream client errors are still the relay's server error
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("400"));
    assert!(error.contains("Unsupported parameter"));
}

#[tokio::test]
async fn test_upstream_empty_body_returns_500() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/responses")
        .with_status(200)
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_unreachable_upstream_returns_500() {
    // Bind then drop a listener to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = app(&format!("http://127.0.0.1:{}", port), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Upstream request failed"), "{}", error);
}

#[tokio::test]
async fn test_shutdown_ends_open_stream() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/responses")
        .with_status(200)
        .with_body("data: {\"type\":\"response.created\"}\n\n")
        .create_async()
        .await;
    let shutdown = CancellationToken::new();
    let app = app_with_shutdown(&server.url(), Some("sk-test"), shutdown.clone());

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown.cancel();
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_health_reports_missing_credential() {
    let app = app("http://127.0.0.1:9", None);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["upstream_credential"]["status"], "error");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_relay_counters() {
    let mut server = mockito::Server::new_async().await;
    let app = app(&server.url(), Some("sk-test"));
    let _mock = server.mock("POST", "/responses").expect(0).create_async().await;

    // Produce at least one labelled sample
    let response = app
        .clone()
        .oneshot(chat_request(Method::POST, r#"{"messages":[]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("relay_requests_total"));
    assert!(text.contains("invalid_request"));
    assert!(text.contains("relay_active_streams"));
    assert!(text.contains("upstream_first_byte_seconds"));
}

#[tokio::test]
async fn test_upstream_redirect_is_not_followed() {
    let mut server = mockito::Server::new_async().await;
    let redirect = server
        .mock("POST", "/responses")
        .with_status(307)
        .with_header("location", "/elsewhere")
        .expect(1)
        .create_async()
        .await;
    let target = server
        .mock("POST", "/elsewhere")
        .with_status(200)
        .with_body("data: redirected\n\n")
        .expect(0)
        .create_async()
        .await;
    let app = app(&server.url(), Some("sk-test"));

    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("307"), "{}", error);
    redirect.assert_async().await;
    target.assert_async().await;
}

/// Reads one HTTP/1.1 request (headers plus `Content-Length` body) off the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "relay closed before sending a full request");
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= head_end + 4 + content_length {
            return;
        }
    }
}

/// True once the peer has closed (EOF or reset) within the deadline.
async fn closed_by_peer(socket: &mut TcpStream) -> bool {
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}

#[tokio::test]
async fn test_client_disconnect_closes_upstream_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (socket_tx, socket_rx) = oneshot::channel::<TcpStream>();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let chunk = "data: {\"type\":\"response.created\"}\n\n";
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            chunk.len(),
            chunk
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        // Keep the stream open; the relay side must be the one to hang up
        let _ = socket_tx.send(socket);
    });

    let app = app(&format!("http://{}", addr), Some("sk-test"));
    let response = app.oneshot(chat_request(Method::POST, CHAT_BODY)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    assert_eq!(
        frame.into_data().unwrap(),
        "data: {\"type\":\"response.created\"}\n\n"
    );

    let mut upstream = socket_rx.await.unwrap();
    drop(body);

    assert!(closed_by_peer(&mut upstream).await, "upstream connection left open");
}

#[tokio::test]
async fn test_abandoned_request_closes_upstream_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (socket_tx, socket_rx) = oneshot::channel::<TcpStream>();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        // Never answer; the request is dropped while waiting for headers
        let _ = socket_tx.send(socket);
    });

    let app = app(&format!("http://{}", addr), Some("sk-test"));
    let pending = tokio::spawn(app.oneshot(chat_request(Method::POST, CHAT_BODY)));

    let mut upstream = socket_rx.await.unwrap();
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    assert!(closed_by_peer(&mut upstream).await, "upstream connection left open");
}
