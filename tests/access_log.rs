//! Access log integration tests against a live listener.

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use api_gateway::{HandlerError, Routes};

mod common;

fn big_json() -> String {
    format!("{{\"data\":\"{}\"}}", "a".repeat(2989))
}

async fn big() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], big_json())
}

async fn binary() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    )
}

async fn empty_binary() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/octet-stream")], Vec::<u8>::new())
}

async fn echo_len(body: Bytes) -> String {
    body.len().to_string()
}

async fn ignore_body() -> &'static str {
    "ignored"
}

async fn boom() -> &'static str {
    panic!("boom")
}

async fn rejected() -> HandlerError {
    HandlerError::new(StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive")
}

fn routes() -> Routes {
    Routes::new()
        .get("/big", big)
        .get("/binary", binary)
        .get("/empty", empty_binary)
        .post("/upload", echo_len)
        .post("/ignore", ignore_body)
        .get("/boom", boom)
        .post("/orders", rejected)
}

#[tokio::test]
async fn test_large_json_response_preview_is_truncated() {
    let gw = common::start_gateway(routes()).await;

    let body = common::client()
        .get(gw.url("/big"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body.len(), 3000);

    let line = gw.body_line_for("/big").await;
    let expected = format!("resBody[3000]:{{{}}}", &big_json()[..2000]);
    assert!(line.ends_with(&expected), "unexpected body line: {line}");

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 200 GET /big 0 3000 127.0.0.1 "));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_binary_response_is_replaced_by_placeholder() {
    let gw = common::start_gateway(routes()).await;
    let client = common::client();

    client.get(gw.url("/binary")).send().await.unwrap();
    client.get(gw.url("/empty")).send().await.unwrap();

    let line = gw.body_line_for("/binary").await;
    assert!(line.ends_with("resBody[10]:[Non-printable ContentType:application/octet-stream]"));

    let line = gw.body_line_for("/empty").await;
    assert!(line.ends_with("resBody[0]:{}"), "unexpected body line: {line}");

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_request_body_preview_and_replay() {
    let gw = common::start_gateway(routes()).await;
    let payload = "x".repeat(2500);

    let received = common::client()
        .post(gw.url("/upload"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(payload.clone())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(received, "2500");

    let line = gw.body_line_for("/upload").await;
    let expected = format!("reqBody[2500]:{{{}}}, resBody[4]:{{2500}}", &payload[..2000]);
    assert!(line.ends_with(&expected), "unexpected body line: {line}");

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 200 POST /upload 2500 4 "));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_unread_request_body_reports_full_length() {
    let gw = common::start_gateway(routes()).await;
    let payload = "x".repeat(200_000);

    // The server may close before the client finishes writing; only the log matters.
    let _ = common::client()
        .post(gw.url("/ignore"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(payload.clone())
        .send()
        .await;

    let line = gw.body_line_for("/ignore").await;
    let expected = format!(
        "reqBody[200000]:{{{}}}, resBody[7]:{{ignored}}",
        &payload[..2000]
    );
    assert!(line.ends_with(&expected), "unexpected body line: {line}");

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 200 POST /ignore 200000 7 "));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_panic_yields_500_and_one_record() {
    let gw = common::start_gateway(routes()).await;

    let response = common::client().get(gw.url("/boom")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let _ = response.text().await;

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 500 GET /boom "));
    assert!(access[0].ends_with(" panic: boom"), "unexpected line: {}", access[0]);

    // Give a duplicate a chance to show up.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(gw.access_lines().len(), 1);
    assert_eq!(gw.body_lines().len(), 1);

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_handler_error_is_logged() {
    let gw = common::start_gateway(routes()).await;

    let response = common::client().post(gw.url("/orders")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let _ = response.text().await;

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 422 POST /orders "));
    assert!(access[0].ends_with(" quantity must be positive"));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_request_id_generated_and_preserved() {
    let gw = common::start_gateway(routes()).await;
    let client = common::client();

    let response = client.get(gw.url("/binary")).send().await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&generated).is_ok());

    let response = client
        .get(gw.url("/empty"))
        .header("x-request-id", "client-supplied-7")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "client-supplied-7");

    let access = gw.wait_for_access(2).await;
    assert!(access.iter().any(|l| l.contains(&format!(" {generated} "))));
    assert!(access.iter().any(|l| l.contains(" client-supplied-7 ")));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_forwarded_for_sets_remote_ip() {
    let gw = common::start_gateway(routes()).await;

    common::client()
        .get(gw.url("/empty"))
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
        .send()
        .await
        .unwrap();

    let access = gw.wait_for_access(1).await;
    assert!(access[0].starts_with("ACCESS 200 GET /empty 0 0 203.0.113.7 "));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_cors_headers_and_preflight() {
    let gw = common::start_gateway(routes()).await;
    let client = common::client();

    let response = client
        .get(gw.url("/big"))
        .header(header::ORIGIN, "https://app.example")
        .send()
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "*");

    let response = client
        .request(reqwest::Method::OPTIONS, gw.url("/orders"))
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "*");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");

    let access = gw.wait_for_access(2).await;
    assert!(access.iter().any(|l| l.starts_with("ACCESS 204 OPTIONS /orders ")));

    gw.gateway.stop().await;
}

#[tokio::test]
async fn test_concurrent_lines_do_not_interleave() {
    let gw = common::start_gateway(routes()).await;
    let client = common::client();

    let requests = (0..25).map(|i| {
        let client = client.clone();
        let url = gw.url(&format!("/big?n={i}"));
        tokio::spawn(async move { client.get(url).send().await.unwrap().text().await.unwrap() })
    });
    for request in requests {
        assert_eq!(request.await.unwrap().len(), 3000);
    }

    let access = gw.wait_for_access(25).await;
    assert_eq!(access.len(), 25);
    for line in &access {
        assert!(line.starts_with("ACCESS 200 GET /big?n="), "torn line: {line}");
    }
    common::wait_until(|| gw.body_lines().len() == 25).await;

    gw.gateway.stop().await;
}
