//! Unit tests for the remote exchange: status classification and a full
//! round trip against a one-shot local HTTP server.

use std::time::Duration;

use marksync::managers::tree_builder::TreeBuilder;
use marksync::services::exchange::{
    classify_status, parse_retry_after, ExchangeRequest, HttpExchange, RemoteExchange,
};
use marksync::types::bookmark::BookmarkModel;
use marksync::types::credential::Credentials;
use marksync::types::errors::ExchangeError;
use marksync::types::serial;
use marksync::types::settings::RemoteSettings;
use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[rstest]
#[case(401, ExchangeError::BadCredentials)]
#[case(403, ExchangeError::BadCredentials)]
#[case(404, ExchangeError::UnknownAccount("alice".to_string()))]
#[case(429, ExchangeError::ServerWait(None))]
#[case(503, ExchangeError::ServerWait(None))]
#[case(500, ExchangeError::HttpStatus(500))]
#[case(302, ExchangeError::HttpStatus(302))]
fn test_classify_status(#[case] code: u16, #[case] expected: ExchangeError) {
    assert_eq!(classify_status(code, None, "alice"), expected);
}

#[test]
fn test_server_wait_keeps_retry_after() {
    let delay = Some(Duration::from_secs(90));
    assert_eq!(classify_status(503, delay, "x"), ExchangeError::ServerWait(delay));
    // only busy statuses carry the delay
    assert_eq!(classify_status(500, delay, "x"), ExchangeError::HttpStatus(500));
}

#[rstest]
#[case("120", Some(Duration::from_secs(120)))]
#[case(" 5 ", Some(Duration::from_secs(5)))]
#[case("0", Some(Duration::ZERO))]
#[case("Wed, 21 Oct 2015 07:28:00 GMT", None)]
#[case("-1", None)]
#[case("", None)]
fn test_parse_retry_after(#[case] value: &str, #[case] expected: Option<Duration>) {
    assert_eq!(parse_retry_after(value), expected);
}

fn sample(seq_no: i64, name: &str) -> BookmarkModel {
    let mut model = BookmarkModel::new();
    {
        let mut b = TreeBuilder::new(&mut model);
        b.edit_root();
        b.set_subscription_seq_no(seq_no);
        b.end_subscription();
        b.start_bookmark();
        b.set_name(name);
        b.set_bookmark_href("https://example.com/");
        b.end_bookmark();
    }
    model
}

/// Accepts one connection, captures the request and answers with `response`.
async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/sync", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).to_string()
    });
    (url, handle)
}

fn http_response(status: &str, headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        body.len(),
        headers,
        body
    )
}

fn request(token: i64) -> ExchangeRequest {
    ExchangeRequest {
        credentials: Credentials::new("alice", "secret"),
        client_id: Uuid::nil(),
        token,
        tree: sample(token, "Local"),
    }
}

fn exchange_for(url: String) -> HttpExchange {
    HttpExchange::new(&RemoteSettings {
        server_url: url,
        request_timeout_secs: 10,
        ..RemoteSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_successful_exchange_returns_server_tree() {
    let reply = serde_json::json!({ "tree": serial::to_serial(&sample(9, "Remote")) });
    let (url, server) = serve_once(http_response("200 OK", "", &reply.to_string())).await;

    let result = exchange_for(url).exchange(request(5)).await.unwrap();
    assert_eq!(result.token(), 9);
    let first = result.tree.children(result.tree.root())[0];
    assert_eq!(result.tree.get(first).name(), "Remote");

    let captured = server.await.unwrap();
    let lower = captured.to_lowercase();
    assert!(lower.starts_with("post /sync"));
    assert!(lower.contains("content-type: application/json"));
    // base64("alice:secret")
    assert!(captured.contains("YWxpY2U6c2VjcmV0"));
    assert!(captured.contains("\"token\":5"));
    assert!(captured.contains("\"Local\""));
}

#[tokio::test]
async fn test_rejected_login_is_permanent() {
    let (url, server) = serve_once(http_response("401 Unauthorized", "", "{}")).await;
    let err = exchange_for(url).exchange(request(0)).await.unwrap_err();
    assert_eq!(err, ExchangeError::BadCredentials);
    assert!(err.is_permanent());
    server.await.unwrap();
}

#[tokio::test]
async fn test_busy_server_passes_retry_after() {
    let (url, server) = serve_once(http_response("503 Service Unavailable", "Retry-After: 45\r\n", "{}")).await;
    let err = exchange_for(url).exchange(request(0)).await.unwrap_err();
    assert_eq!(err, ExchangeError::ServerWait(Some(Duration::from_secs(45))));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(45)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let (url, server) = serve_once(http_response("200 OK", "", "not json at all")).await;
    let err = exchange_for(url).exchange(request(0)).await.unwrap_err();
    assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    assert!(!err.is_permanent());
    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_temporary() {
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = exchange_for(format!("http://127.0.0.1:{}/sync", port))
        .exchange(request(0))
        .await
        .unwrap_err();
    assert!(!err.is_permanent(), "unexpected permanent error: {:?}", err);
}
