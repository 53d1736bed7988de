use crate::backend_mock::{batch, complete, config_for, parse_sse, result_json, row_json, sse_body};
use planstream::gateway::{AppState, build_app};
use planstream::session::SessionOrchestrator;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct GatewayTestServer {
    base: String,
    handle: tokio::task::JoinHandle<()>,
}

impl GatewayTestServer {
    async fn start(backend: &MockServer) -> Self {
        let config = config_for(backend);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral gateway listener should bind");
        let port = listener
            .local_addr()
            .expect("ephemeral gateway listener should expose local address")
            .port();

        let state = AppState {
            orchestrator: Arc::new(SessionOrchestrator::from_config(&config)),
            event_buffer: config.gateway.event_buffer,
        };
        let app = build_app(state, &config.gateway);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("gateway should serve");
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            handle,
        }
    }
}

impl Drop for GatewayTestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let backend = MockServer::start().await;
    let gateway = GatewayTestServer::start(&backend).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", gateway.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn chat_turn_streams_create_and_search_events_in_order() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({"title": "Montana State shirts"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(row_json(12, "Montana State shirts")),
        )
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows/12/search/stream"))
        .and(body_partial_json(json!({"query": "Montana State shirts"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[
                    batch(
                        "amazon",
                        &[
                            result_json("MSU Bobcats tee", 24.99),
                            result_json("Montana State hoodie", 49.0),
                        ],
                        true,
                    ),
                    batch("ebay", &[result_json("Vintage MSU shirt", 18.5)], false),
                    complete(&["amazon", "ebay"]),
                ])),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = GatewayTestServer::start(&backend).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api/chat", gateway.base))
        .header("authorization", "Bearer user-token")
        .json(&json!({
            "messages": [{"role": "user", "content": "Montana State shirts"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let body = response.text().await.unwrap();
    let events = parse_sse(&body);
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "assistant_message",
            "action_started",
            "row_created",
            "action_started",
            "search_results",
            "search_results",
            "done",
        ]
    );

    assert_eq!(events[1].1["type"], "create_row");
    assert_eq!(events[2].1["row"]["id"], 12);
    assert_eq!(events[3].1["type"], "search");
    assert_eq!(events[3].1["query"], "Montana State shirts");
    assert_eq!(events[4].1["provider"], "amazon");
    assert_eq!(events[4].1["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(events[5].1["more_incoming"], false);
    assert_eq!(events[6].1["row_id"], 12);
}

#[tokio::test]
async fn backend_failure_ends_stream_with_single_error() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = GatewayTestServer::start(&backend).await;
    let body = reqwest::Client::new()
        .post(format!("{}/api/chat", gateway.base))
        .json(&json!({"messages": [{"role": "user", "content": "office chairs"}]}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = parse_sse(&body);
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["assistant_message", "action_started", "error"]);
    assert_eq!(events[2].1["action"], "create_row");
    assert_eq!(events[2].1["action_index"], 0);
}

#[tokio::test]
async fn unknown_active_row_is_ignored() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rows/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(201).set_body_json(row_json(1, "Lamps")))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows/1/search/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body(&[batch("amazon", &[], false), complete(&["amazon"])])),
        )
        .mount(&backend)
        .await;

    let gateway = GatewayTestServer::start(&backend).await;
    let body = reqwest::Client::new()
        .post(format!("{}/api/chat", gateway.base))
        .json(&json!({
            "messages": [{"role": "user", "content": "lamps"}],
            "activeRowId": 404
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = parse_sse(&body);
    assert_eq!(events.first().map(|(n, _)| n.as_str()), Some("assistant_message"));
    assert_eq!(events.last().map(|(n, _)| n.as_str()), Some("done"));
    assert_eq!(events.last().unwrap().1["row_id"], 1);
}

#[tokio::test]
async fn malformed_body_is_rejected_before_streaming() {
    let backend = MockServer::start().await;
    let gateway = GatewayTestServer::start(&backend).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/chat", gateway.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
