//! End-to-end governor tests against a scripted local HTTP server.
//!
//! The server speaks just enough HTTP/1.1 for reqwest: it reads one
//! request (headers plus `Content-Length` body), records it, and writes a
//! scripted response, keeping the connection alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use cord_proto::ChannelId;
use cord_rest::{CreateMessage, EditChannel, Http, HttpConfig, RestError, RetryConfig};

/// One observed request.
#[derive(Debug, Clone)]
struct Hit {
    method: String,
    path: String,
    at: Instant,
    headers: HashMap<String, String>,
}

type Responder = dyn Fn(&Hit, usize) -> String + Send + Sync;

struct ScriptedServer {
    addr: std::net::SocketAddr,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl ScriptedServer {
    async fn start(responder: Arc<Responder>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Arc<Mutex<Vec<Hit>>> = Arc::new(Mutex::new(Vec::new()));

        let hits_for_server = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hits = Arc::clone(&hits_for_server);
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    let mut buffer: Vec<u8> = Vec::new();
                    loop {
                        // Read until the header terminator.
                        let header_end = loop {
                            if let Some(pos) = find_header_end(&buffer) {
                                break pos;
                            }
                            let mut chunk = [0u8; 4096];
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                            }
                        };

                        let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
                        let mut lines = head.lines();
                        let request_line = lines.next().unwrap_or_default().to_string();
                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default().to_string();
                        let target = parts.next().unwrap_or_default().to_string();
                        let path = target.split('?').next().unwrap_or_default().to_string();

                        let mut headers = HashMap::new();
                        for line in lines {
                            if let Some((name, value)) = line.split_once(':') {
                                headers.insert(
                                    name.trim().to_ascii_lowercase(),
                                    value.trim().to_string(),
                                );
                            }
                        }

                        let body_len: usize = headers
                            .get("content-length")
                            .and_then(|value| value.parse().ok())
                            .unwrap_or(0);
                        let total = header_end + 4 + body_len;
                        while buffer.len() < total {
                            let mut chunk = [0u8; 4096];
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                            }
                        }
                        buffer.drain(..total);

                        let hit = Hit {
                            method,
                            path: path.clone(),
                            at: Instant::now(),
                            headers,
                        };
                        let count = {
                            let mut hits = hits.lock();
                            hits.push(hit.clone());
                            hits.iter().filter(|h| h.path == path).count()
                        };

                        let response = responder(&hit, count);
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self { addr, hits }
    }

    fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    fn hits_for(&self, path: &str) -> Vec<Hit> {
        self.hits
            .lock()
            .iter()
            .filter(|hit| hit.path == path)
            .cloned()
            .collect()
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn http_response(status: u16, reason: &str, headers: &[(&str, String)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!("content-length: {}\r\n\r\n{body}", body.len()));
    response
}

fn ok_json(body: &str) -> String {
    http_response(
        200,
        "OK",
        &[("content-type", "application/json".to_string())],
        body,
    )
}

fn fast_http(server: &ScriptedServer) -> Http {
    Http::new(
        HttpConfig::new("test-token")
            .with_base_url(server.base_url())
            .with_retry(RetryConfig {
                backoff_base: Duration::from_millis(5),
                backoff_cap: Duration::from_millis(50),
                max_attempts: 5,
                max_rate_limit_retries: 5,
            }),
    )
    .unwrap()
}

#[tokio::test]
async fn sends_auth_and_user_agent_headers() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        ok_json(r#"{"url": "wss://gateway.example"}"#)
    }))
    .await;
    let http = fast_http(&server);

    let info = http.get_gateway().await.unwrap();
    assert_eq!(info.url, "wss://gateway.example");

    let hits = server.hits_for("/api/v10/gateway");
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].headers.get("authorization").map(String::as_str),
        Some("Bot test-token")
    );
    let user_agent = hits[0].headers.get("user-agent").unwrap();
    assert!(user_agent.starts_with("DiscordBot ("));
}

#[tokio::test]
async fn audit_log_reason_header_is_passed() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        ok_json(r#"{"id": "1", "type": 0}"#)
    }))
    .await;
    let http = fast_http(&server);

    http.edit_channel(
        ChannelId::new(1),
        &EditChannel {
            name: Some("renamed".into()),
            ..EditChannel::default()
        },
        Some("cleanup"),
    )
    .await
    .unwrap();

    let hits = server.hits_for("/api/v10/channels/1");
    assert_eq!(
        hits[0].headers.get("x-audit-log-reason").map(String::as_str),
        Some("cleanup")
    );
}

#[tokio::test]
async fn legacy_v6_path_is_used_when_configured() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        ok_json(r#"{"url": "wss://gateway.example"}"#)
    }))
    .await;

    let http = Http::new(
        HttpConfig::new("t")
            .with_base_url(server.base_url())
            .with_version(6),
    )
    .unwrap();
    http.get_gateway().await.unwrap();

    assert_eq!(server.hits_for("/api/v6/gateway").len(), 1);
}

#[tokio::test]
async fn global_429_pauses_other_routes() {
    // First hit on channel 1 answers a global 429 with a 300ms pause;
    // everything else answers 200.
    let server = ScriptedServer::start(Arc::new(|hit: &Hit, count| {
        if hit.path == "/api/v10/channels/1/messages" && count == 1 {
            http_response(
                429,
                "Too Many Requests",
                &[
                    ("retry-after", "0.3".to_string()),
                    ("x-ratelimit-global", "true".to_string()),
                ],
                r#"{"global": true, "message": "rate limited"}"#,
            )
        } else {
            ok_json(r#"{"id": "9", "channel_id": "0"}"#)
        }
    }))
    .await;
    let http = Arc::new(fast_http(&server));

    let first = {
        let http = Arc::clone(&http);
        tokio::spawn(async move {
            http.create_message(ChannelId::new(1), &CreateMessage::default(), None)
                .await
        })
    };

    // Wait until the governor has actually engaged the lockout before
    // submitting the second request on a different route.
    loop {
        if http.limiter().global().is_locked() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let lockout_start = Instant::now();

    http.create_message(ChannelId::new(2), &CreateMessage::default(), None)
        .await
        .unwrap();
    first.await.unwrap().unwrap();

    // The second route's only wire hit happened after the global pause.
    let other_hits = server.hits_for("/api/v10/channels/2/messages");
    assert_eq!(other_hits.len(), 1);
    assert!(
        other_hits[0].at.duration_since(lockout_start) >= Duration::from_millis(250),
        "second route went out during the global lockout"
    );
}

#[tokio::test]
async fn exhausted_bucket_serializes_patches() {
    // Every response reports a one-request window resetting 200ms out.
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        let reset = (Utc::now().timestamp_millis() as f64 + 200.0) / 1000.0;
        http_response(
            200,
            "OK",
            &[
                ("content-type", "application/json".to_string()),
                ("x-ratelimit-limit", "1".to_string()),
                ("x-ratelimit-remaining", "0".to_string()),
                ("x-ratelimit-reset", format!("{reset:.3}")),
            ],
            r#"{"id": "123", "type": 0}"#,
        )
    }))
    .await;
    let http = Arc::new(fast_http(&server));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let http = Arc::clone(&http);
        tasks.push(tokio::spawn(async move {
            http.edit_channel(ChannelId::new(123), &EditChannel::default(), None)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let hits = server.hits_for("/api/v10/channels/123");
    assert_eq!(hits.len(), 4);
    assert!(hits.iter().all(|hit| hit.method == "PATCH"));
    for pair in hits.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(
            gap >= Duration::from_millis(150),
            "requests {gap:?} apart; expected one per window"
        );
    }
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let server = ScriptedServer::start(Arc::new(|_hit, count| {
        if count <= 2 {
            http_response(502, "Bad Gateway", &[], "upstream broke")
        } else {
            ok_json(r#"{"url": "wss://gateway.example"}"#)
        }
    }))
    .await;
    let http = fast_http(&server);

    let info = http.get_gateway().await.unwrap();
    assert_eq!(info.url, "wss://gateway.example");
    assert_eq!(server.hits_for("/api/v10/gateway").len(), 3);
}

#[tokio::test]
async fn client_errors_surface_immediately() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        http_response(403, "Forbidden", &[], r#"{"message": "missing access"}"#)
    }))
    .await;
    let http = fast_http(&server);

    match http.get_gateway().await {
        Err(RestError::HttpStatus { code, body }) => {
            assert_eq!(code, 403);
            assert!(body.contains("missing access"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert_eq!(server.hits_for("/api/v10/gateway").len(), 1);
}

#[tokio::test]
async fn bulk_delete_age_guard_never_reaches_the_wire() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| ok_json("{}"))).await;
    let http = fast_http(&server);

    let now_ms = Utc::now().timestamp_millis() as u64;
    let fresh = cord_proto::MessageId::new((now_ms - cord_proto::id::EPOCH_MS) << 22);
    let twenty_days_ms = 20 * 24 * 60 * 60 * 1000;
    let stale =
        cord_proto::MessageId::new((now_ms - cord_proto::id::EPOCH_MS - twenty_days_ms) << 22);

    let result = http
        .bulk_delete_messages(ChannelId::new(5), &[fresh, stale])
        .await;

    assert!(matches!(result, Err(RestError::MessageTooOld { .. })));
    assert!(server.hits_for("/api/v10/channels/5/messages/bulk-delete").is_empty());
}

#[tokio::test]
async fn rate_limit_headers_update_budget_without_sleeping() {
    // limit=3 remaining=2: three GETs in a row go straight through.
    let server = ScriptedServer::start(Arc::new(|_hit, _count| {
        let reset = (Utc::now().timestamp_millis() as f64 + 60_000.0) / 1000.0;
        http_response(
            200,
            "OK",
            &[
                ("content-type", "application/json".to_string()),
                ("x-ratelimit-limit", "3".to_string()),
                ("x-ratelimit-remaining", "2".to_string()),
                ("x-ratelimit-reset", format!("{reset:.3}")),
            ],
            r#"{"id": "1", "type": 0}"#,
        )
    }))
    .await;
    let http = fast_http(&server);

    let start = Instant::now();
    for _ in 0..3 {
        http.get_channel(ChannelId::new(1)).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(server.hits_for("/api/v10/channels/1").len(), 3);
}

#[tokio::test]
async fn request_body_is_resent_identically_on_retry() {
    let server = ScriptedServer::start(Arc::new(|_hit, count| {
        if count == 1 {
            http_response(500, "Internal Server Error", &[], "")
        } else {
            ok_json(r#"{"id": "9", "channel_id": "1"}"#)
        }
    }))
    .await;
    let http = fast_http(&server);

    http.create_message(
        ChannelId::new(1),
        &CreateMessage {
            content: "hello twice".into(),
            tts: false,
        },
        None,
    )
    .await
    .unwrap();

    let hits = server.hits_for("/api/v10/channels/1/messages");
    assert_eq!(hits.len(), 2);
    let lengths: Vec<_> = hits
        .iter()
        .map(|hit| hit.headers.get("content-length").cloned())
        .collect();
    assert_eq!(lengths[0], lengths[1]);
}

#[tokio::test]
async fn query_parameters_reach_the_wire() {
    let server = ScriptedServer::start(Arc::new(|_hit, _count| ok_json("[]"))).await;
    let http = fast_http(&server);

    http.get_messages(ChannelId::new(8), 50).await.unwrap();

    // Path recorded without query; the request itself carried it.
    assert_eq!(server.hits_for("/api/v10/channels/8/messages").len(), 1);
}
