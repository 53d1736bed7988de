use crate::backend_mock::{batch, collect, config_for, names, result_json, row_json, sse_body};
use planstream::backend::BackendClient;
use planstream::executor::{ActionExecutor, ExecutionContext, ExecutionOutcome};
use planstream::planner::Action;
use planstream::stream::EventWriter;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor_for(server: &MockServer) -> ActionExecutor {
    let config = config_for(server);
    ActionExecutor::new(Arc::new(BackendClient::new(&config)), 10)
}

fn constraints(value: Value) -> BTreeMap<String, Value> {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn failing_action_halts_the_plan_with_one_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(201).set_body_json(row_json(5, "Desk")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rows/99"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/outreach/rows/5/trigger"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vendors_contacted": 3})))
        .expect(0)
        .mount(&server)
        .await;

    let plan = vec![
        Action::CreateRow {
            title: "Desk".into(),
            constraints: BTreeMap::new(),
            search_query: None,
            providers: None,
        },
        Action::UpdateRow {
            row_id: Some(99),
            title: None,
            constraints: Some(constraints(json!({"color": "red"}))),
            search_query: None,
            providers: None,
        },
        Action::VendorOutreach {
            row_id: None,
            category: "furniture".into(),
            vendor_limit: None,
        },
    ];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(64, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Halted { index: 1 });
    assert_eq!(ctx.last_row_id, Some(5));

    let frames = collect(rx).await;
    assert_eq!(
        names(&frames),
        vec!["action_started", "row_created", "action_started", "error"]
    );
    let error = &frames[3].data;
    assert_eq!(error["action_index"], 1);
    assert_eq!(error["action"], "update_row");
    assert!(
        frames
            .iter()
            .all(|f| f.name != "action_started" || f.data["index"] != 2)
    );
}

#[tokio::test]
async fn timed_out_create_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(row_json(1, "Desk"))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::CreateRow {
        title: "Desk".into(),
        constraints: BTreeMap::new(),
        search_query: Some("desk".into()),
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Halted { index: 0 });
    assert_eq!(ctx.last_row_id, None);
    assert_eq!(names(&collect(rx).await), vec!["action_started", "error"]);
}

#[tokio::test]
async fn timed_out_update_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rows/4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(row_json(4, "Desk"))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::UpdateRow {
        row_id: Some(4),
        title: Some("Standing desk".into()),
        constraints: None,
        search_query: None,
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Halted { index: 0 });
    assert_eq!(names(&collect(rx).await), vec!["action_started", "error"]);
}

#[tokio::test]
async fn update_replaces_stored_constraints() {
    let server = MockServer::start().await;
    // Stored row has {"size": "M"}; the patch must carry only the new set.
    Mock::given(method("PATCH"))
        .and(path("/rows/7"))
        .and(body_partial_json(json!({
            "choice_answers": "{\"color\":\"red\"}",
            "request_spec": {"constraints": "{\"color\":\"red\"}"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "title": "Shirts",
            "choice_answers": "{\"color\":\"red\"}"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::UpdateRow {
        row_id: Some(7),
        title: None,
        constraints: Some(constraints(json!({"color": "red"}))),
        search_query: None,
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(ctx.last_row_id, Some(7));
    let frames = collect(rx).await;
    assert_eq!(names(&frames), vec!["action_started", "row_updated"]);
    assert_eq!(frames[1].data["row"]["choice_answers"], "{\"color\":\"red\"}");
}

#[tokio::test]
async fn open_search_stream_gets_a_closing_delta() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows/3/search/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[batch(
                    "amazon",
                    &[result_json("Blue mug", 12.0)],
                    true,
                )])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::Search {
        row_id: Some(3),
        query: "blue mug".into(),
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    let frames = collect(rx).await;
    assert_eq!(
        names(&frames),
        vec!["action_started", "search_results", "search_results"]
    );
    assert_eq!(frames[1].data["more_incoming"], true);
    assert_eq!(frames[1].data["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(frames[2].data["more_incoming"], false);
    assert_eq!(frames[2].data["provider"], "all");
}

#[tokio::test]
async fn outreach_reports_vendor_count_without_moving_the_active_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/outreach/rows/8/trigger"))
        .and(body_partial_json(json!({"category": "catering", "vendor_limit": 10})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vendors_contacted": 4})))
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::VendorOutreach {
        row_id: Some(8),
        category: "catering".into(),
        vendor_limit: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::new(BTreeMap::new(), Some(2), None);
    executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(ctx.last_row_id, Some(2));
    let frames = collect(rx).await;
    assert_eq!(names(&frames), vec!["action_started", "outreach_triggered"]);
    assert_eq!(frames[1].data["vendors_contacted"], 4);
    assert_eq!(frames[1].data["row_id"], 8);
}

#[tokio::test]
async fn search_without_row_id_targets_the_row_just_created() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .respond_with(ResponseTemplate::new(201).set_body_json(row_json(12, "Walnut desk")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows/12/search/stream"))
        .and(body_partial_json(json!({"query": "walnut desk"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[batch(
                    "amazon",
                    &[result_json("Walnut desk", 340.0)],
                    false,
                )])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![
        Action::CreateRow {
            title: "Walnut desk".into(),
            constraints: BTreeMap::new(),
            search_query: None,
            providers: None,
        },
        Action::Search {
            row_id: None,
            query: "walnut desk".into(),
            providers: None,
        },
    ];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(ctx.last_row_id, Some(12));
    let frames = collect(rx).await;
    assert_eq!(
        names(&frames),
        vec!["action_started", "row_created", "action_started", "search_results"]
    );
    assert_eq!(frames[2].data["row_id"], 12);
    assert_eq!(frames[3].data["row_id"], 12);
}

#[tokio::test]
async fn search_with_no_active_row_creates_one_from_the_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .and(body_partial_json(json!({"title": "desk lamp"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(row_json(21, "desk lamp")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows/21/search/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[batch(
                    "ebay",
                    &[result_json("Brass desk lamp", 45.0)],
                    false,
                )])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::Search {
        row_id: None,
        query: "desk lamp".into(),
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(ctx.last_row_id, Some(21));
    let frames = collect(rx).await;
    assert_eq!(
        names(&frames),
        vec!["action_started", "row_created", "search_results"]
    );
    assert!(frames[0].data["row_id"].is_null());
    assert_eq!(frames[1].data["row"]["id"], 21);
    assert_eq!(frames[2].data["row_id"], 21);
}

#[tokio::test]
async fn update_with_no_active_row_creates_one_and_searches_it() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(row_json(1, "unused")))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows"))
        .and(body_partial_json(json!({
            "title": "Oak bookshelf",
            "choice_answers": "{\"material\":\"oak\"}"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(row_json(30, "Oak bookshelf")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rows/30/search/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[batch("amazon", &[], false)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::UpdateRow {
        row_id: None,
        title: Some("Oak bookshelf".into()),
        constraints: Some(constraints(json!({"material": "oak"}))),
        search_query: Some("oak bookshelf".into()),
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(ctx.last_row_id, Some(30));
    assert_eq!(
        names(&collect(rx).await),
        vec!["action_started", "row_created", "action_started", "search_results"]
    );
}

#[tokio::test]
async fn outreach_with_no_active_row_is_rejected() {
    let server = MockServer::start().await;

    let plan = vec![Action::VendorOutreach {
        row_id: None,
        category: "catering".into(),
        vendor_limit: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Halted { index: 0 });
    let frames = collect(rx).await;
    assert_eq!(names(&frames), vec!["action_started", "error"]);
    assert_eq!(frames[1].data["action"], "vendor_outreach");
    assert!(
        frames[1].data["message"]
            .as_str()
            .is_some_and(|m| m.contains("no target row"))
    );
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn empty_update_still_reports_the_row() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(row_json(6, "Lamp")))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rows/6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(row_json(6, "Lamp")))
        .expect(1)
        .mount(&server)
        .await;

    let plan = vec![Action::UpdateRow {
        row_id: Some(6),
        title: Some("  ".into()),
        constraints: None,
        search_query: None,
        providers: None,
    }];

    let cancel = CancellationToken::new();
    let (mut writer, rx) = EventWriter::channel(16, cancel.clone());
    let mut ctx = ExecutionContext::default();
    let outcome = executor_for(&server)
        .execute_plan(&plan, &mut ctx, &mut writer, &cancel)
        .await
        .unwrap();
    writer.close();

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(ctx.last_row_id, Some(6));
    let frames = collect(rx).await;
    assert_eq!(names(&frames), vec!["action_started", "row_updated"]);
    assert_eq!(frames[1].data["row"]["id"], 6);
    assert_eq!(frames[1].data["row"]["title"], "Lamp");
}
