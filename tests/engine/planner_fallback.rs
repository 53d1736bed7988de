use planstream::Config;
use planstream::planner::{Action, ChatMessage, FallbackPlanGenerator, PlanGenerator, PlanRequest};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn llm_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.planner.enabled = true;
    config.planner.api_key = Some("sk-test".into());
    config.planner.api_url = format!("{}/v1/chat/completions", server.uri());
    config.planner.timeout_ms = 1_000;
    config
}

fn request(text: &str) -> PlanRequest {
    PlanRequest {
        messages: vec![ChatMessage::user(text)],
        ..PlanRequest::default()
    }
}

#[tokio::test]
async fn llm_plan_is_used_when_the_endpoint_answers() {
    let server = MockServer::start().await;
    let content = json!({
        "assistant_message": "Looking for standing desks.",
        "actions": [{"type": "create_row", "title": "Standing desk", "search_query": "standing desk"}]
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let planner = FallbackPlanGenerator::from_config(&llm_config(&server));
    let plan = planner
        .generate(&request("standing desk"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(plan.assistant_message, "Looking for standing desks.");
    assert!(matches!(
        plan.actions.as_slice(),
        [Action::CreateRow { title, .. }] if title == "Standing desk"
    ));
}

#[tokio::test]
async fn falls_back_to_rules_when_the_llm_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let planner = FallbackPlanGenerator::from_config(&llm_config(&server));
    let plan = planner
        .generate(&request("find me a standing desk under $400"), &CancellationToken::new())
        .await
        .unwrap();

    match plan.actions.as_slice() {
        [
            Action::CreateRow {
                title, constraints, ..
            },
        ] => {
            assert_eq!(title, "Standing desk");
            assert_eq!(constraints.get("max_price"), Some(&json!(400.0)));
        }
        other => panic!("unexpected actions: {other:?}"),
    }
}

#[tokio::test]
async fn falls_back_to_rules_when_the_llm_returns_garbage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "I cannot help with that."}}]
        })))
        .mount(&server)
        .await;

    let planner = FallbackPlanGenerator::from_config(&llm_config(&server));
    let plan = planner
        .generate(&request("office chairs"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions[0].kind().to_string(), "create_row");
}
