//! Live adapter against a scripted local HTTP server

use std::time::Duration;

use canvas_engine::{AnalysisAdapter, HttpAdapter, MockAdapter};
use canvas_model::{ErrorCode, LimitsSource, RunCompletion, RunRequest, StreamEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one request and return its head, lowercased
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return String::from_utf8_lossy(&buf).to_lowercase();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < end + 4 + length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return head;
        }
    }
}

/// Serve one scripted response per connection, then stop
async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut heads = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            heads.push(read_request(&mut socket).await);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        heads
    });
    (base, handle)
}

fn sse(frames: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{frames}"
    )
}

fn frame(id: u32, event: &str, data: &str) -> String {
    format!("id: {id}\nevent: {event}\ndata: {data}\n\n")
}

async fn drain(adapter: &HttpAdapter, request: &RunRequest) -> Vec<StreamEvent> {
    let mut stream = adapter.stream_run(request).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn dropped_stream_resumes_with_last_event_id() {
    let request = RunRequest::new("pricing-v1").with_seed(1337u64);
    let report = MockAdapter::default().run(&request).await.unwrap();
    let done = serde_json::to_string(&RunCompletion::plain(report.clone())).unwrap();
    let hello = r#"{"response_id":"r-1"}"#;

    let first = sse(&(frame(1, "hello", hello) + &frame(2, "tick", r#"{"index":1}"#)));
    let second = sse(
        &(frame(1, "hello", hello)
            + ": keepalive\n\n"
            + &frame(3, "tick", r#"{"index":2}"#)
            + &frame(4, "done", &done)),
    );
    let (base, server) = serve(vec![first, second]).await;
    let adapter = HttpAdapter::new(&base, Duration::from_secs(5), 2).unwrap();

    let events = drain(&adapter, &request).await;
    let names: Vec<&str> = events.iter().map(StreamEvent::name).collect();
    assert_eq!(names, vec!["hello", "tick", "reconnected", "tick", "done"]);
    assert_eq!(events[2], StreamEvent::Reconnected { attempt: 1 });
    match &events[4] {
        StreamEvent::Done(completion) => {
            assert_eq!(completion.report, report);
            let diagnostics = completion.diagnostics.as_ref().unwrap();
            assert_eq!(diagnostics.resumes, 1);
            assert_eq!(diagnostics.recovered_events, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    let heads = server.await.unwrap();
    assert!(heads[0].starts_with("post /v1/stream"));
    assert!(!heads[0].contains("last-event-id"));
    assert!(heads[1].contains("last-event-id: 2"));
}

#[tokio::test]
async fn resumes_are_bounded() {
    let hello = frame(1, "hello", r#"{"response_id":"r-2"}"#);
    let (base, server) = serve(vec![sse(&hello), sse("")]).await;
    let adapter = HttpAdapter::new(&base, Duration::from_secs(5), 1).unwrap();

    let events = drain(&adapter, &RunRequest::new("pricing-v1")).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], StreamEvent::Reconnected { attempt: 1 });
    match &events[2] {
        StreamEvent::Error(err) => assert_eq!(err.code, ErrorCode::Network),
        other => panic!("unexpected {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn rate_limit_status_honours_retry_after_header() {
    let response =
        "HTTP/1.1 429 Too Many Requests\r\nretry-after: 7\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    let (base, server) = serve(vec![response.to_string()]).await;
    let adapter = HttpAdapter::new(&base, Duration::from_secs(5), 2).unwrap();

    let err = adapter
        .stream_run(&RunRequest::new("pricing-v1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimited);
    assert_eq!(err.retry_after, Some(7));
    server.await.unwrap();
}

#[tokio::test]
async fn structured_error_body_is_preserved() {
    let body = r#"{"code":"BAD_INPUT","message":"edge e9 is dangling","fields":["edges.e9"]}"#;
    let response = format!(
        "HTTP/1.1 400 Bad Request\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let (base, server) = serve(vec![response]).await;
    let adapter = HttpAdapter::new(&base, Duration::from_secs(5), 2).unwrap();

    let err = adapter.run(&RunRequest::new("pricing-v1")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadInput);
    assert_eq!(err.fields, vec!["edges.e9".to_string()]);
    server.await.unwrap();
}

#[tokio::test]
async fn missing_limits_endpoint_means_fallback() {
    let response = "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    let (base, server) = serve(vec![response.to_string()]).await;
    let adapter = HttpAdapter::new(&base, Duration::from_secs(5), 2).unwrap();

    let limits = adapter.limits().await.unwrap();
    assert_eq!(limits.source, LimitsSource::Fallback);
    server.await.unwrap();
}
