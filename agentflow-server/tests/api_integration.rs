//! Router-level tests of the JSON API
//!
//! Every test builds its own app on an in-memory database and drives it with
//! `tower::ServiceExt::oneshot`.

use agentflow_server::{
    config::Config,
    server::{build_router, AppState},
    storage::{DatabaseConfig, StorageManager},
};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn create_test_app() -> Router {
    let mut config = Config::default();
    config.database = DatabaseConfig::in_memory();
    let storage = StorageManager::new(&config.database)
        .await
        .expect("Failed to create in-memory storage");
    let state = AppState::new(&config, storage)
        .await
        .expect("Failed to build app state");
    build_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

async fn run_invoice(app: &Router) -> Value {
    let (status, body) = post(
        app,
        "/workflows/execute",
        json!({
            "template_id": "invoice_processing",
            "initial_variables": {"file": "scans/staples-0042.pdf", "amount": 500.0},
            "tenant_id": "acme",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["templates"], 3);
}

#[tokio::test]
async fn test_execute_status_and_result() {
    let app = create_test_app().await;
    let body = run_invoice(&app).await;
    assert_eq!(body["status"], "completed");
    assert!(body["completed_at"].is_string());

    let id = body["execution_id"].as_str().unwrap();
    let (status, body) = get(&app, &format!("/workflows/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "acme");
    let steps = body["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 4);
    assert!(steps.iter().all(|step| step["status"] == "completed"));

    let (status, body) = get(&app, &format!("/workflows/{}/result", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variables"]["category"], "office_supplies");
    assert_eq!(body["variables"]["vat_amount"], 100.0);
    assert_eq!(body["variables"]["total_due"], 600.0);
}

#[tokio::test]
async fn test_execute_unknown_template_is_bad_request() {
    let app = create_test_app().await;
    let (status, body) = post(
        &app,
        "/workflows/execute",
        json!({"template_id": "does_not_exist", "initial_variables": {}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("does_not_exist"));
}

#[tokio::test]
async fn test_unknown_and_malformed_execution_ids() {
    let app = create_test_app().await;

    let (status, body) = get(
        &app,
        "/workflows/00000000-0000-4000-8000-000000000000/status",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = get(&app, "/workflows/not-a-uuid/result").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_execution_result_and_cancel() {
    let app = create_test_app().await;
    // no file: the OCR agent rejects its input
    let (status, body) = post(
        &app,
        "/workflows/execute",
        json!({"template_id": "vat_calculation", "initial_variables": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert!(body["error"].as_str().unwrap().contains("ocr_extract"));

    let id = body["execution_id"].as_str().unwrap();
    let (status, body) = get(&app, &format!("/workflows/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["steps"][1]["status"], "skipped");

    let (status, _) = get(&app, &format!("/workflows/{}/result", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, &format!("/workflows/{}/cancel", id), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already"));
}

#[tokio::test]
async fn test_background_execution_completes() {
    let app = create_test_app().await;
    let (status, body) = post(
        &app,
        "/workflows/execute",
        json!({
            "template_id": "monthly_report",
            "initial_variables": {"period": "2024-05"},
            "background": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    let id = body["execution_id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, body) = get(&app, &format!("/workflows/{}/status", id)).await;
        if body["status"] == "completed" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "completed");

    let (status, body) = get(&app, &format!("/workflows/{}/result", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variables"]["report_path"], "reports/2024-05.pdf");
}

#[tokio::test]
async fn test_agent_queries() {
    let app = create_test_app().await;

    let (_, body) = get(&app, "/agents").await;
    assert_eq!(body["total"], 7);

    let (_, body) = get(&app, "/agents?capability=categorization").await;
    assert_eq!(body["total"], 2);

    let (_, body) = get(&app, "/agents?type=finance").await;
    assert_eq!(body["total"], 3);

    let (_, body) = get(&app, "/agents?type=finance&capability=vat").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["agents"][0]["agent_id"], "calculate_vat");
}

#[tokio::test]
async fn test_list_executions_and_metrics() {
    let app = create_test_app().await;
    run_invoice(&app).await;
    post(
        &app,
        "/workflows/execute",
        json!({"template_id": "vat_calculation", "initial_variables": {}}),
    )
    .await;

    let (_, body) = get(&app, "/executions").await;
    assert_eq!(body["total"], 2);

    let (_, body) = get(&app, "/executions?status=completed").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["executions"][0]["template_id"], "invoice_processing");

    let (_, body) = get(&app, "/executions?tenant_id=acme").await;
    assert_eq!(body["total"], 1);

    let (status, _) = get(&app, "/executions?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hours_back"], 24);
    assert_eq!(body["metrics"]["total_executions"], 2);
    assert_eq!(body["metrics"]["completed"], 1);
    assert_eq!(body["metrics"]["failed"], 1);

    let (_, body) = get(&app, "/metrics?tenant_id=acme&hours_back=1").await;
    assert_eq!(body["metrics"]["total_executions"], 1);

    let (status, body) = get(&app, "/metrics?hours_back=4294967295").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["total_executions"], 2);
}

#[tokio::test]
async fn test_copilot_execute() {
    let app = create_test_app().await;
    let (status, body) = post(
        &app,
        "/copilot/execute",
        json!({
            "command": "Process invoice scans/hotel-0815.pdf for March 2024",
            "context": {"amount": 300.0},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["template_id"], "invoice_processing");
    assert_eq!(body["variables"]["file"], "scans/hotel-0815.pdf");
    assert_eq!(body["variables"]["period"], "2024-03");
    assert_eq!(body["execution"]["status"], "completed");

    let id = body["execution"]["execution_id"].as_str().unwrap();
    let (_, body) = get(&app, &format!("/workflows/{}/result", id)).await;
    assert_eq!(body["variables"]["category"], "travel");
    assert_eq!(body["variables"]["total_due"], 360.0);
}

#[tokio::test]
async fn test_copilot_rejects_unmatched_command() {
    let app = create_test_app().await;
    let (status, body) = post(&app, "/copilot/execute", json!({"command": "water the plants"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no workflow"));
}

#[tokio::test]
async fn test_messages_expose_bus_history() {
    let app = create_test_app().await;
    let (status, _) = post(
        &app,
        "/copilot/execute",
        json!({"command": "Email the monthly report for Q1 2024 as csv"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/messages?agent_id=email_sender").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["messages"][0]["payload"]["attachment"], "reports/2024-Q1.csv");
}

#[tokio::test]
async fn test_saved_workflows() {
    let app = create_test_app().await;
    let template = json!({
        "template_id": "receipt_vat",
        "name": "Receipt VAT",
        "steps": [
            {
                "step_id": "scan",
                "agent_id": "ocr_extract",
                "input_mapping": {"file": "file"},
                "output_mapping": {"amount": "amount"}
            },
            {
                "step_id": "vat",
                "agent_id": "calculate_vat",
                "input_mapping": {"amount": "amount"},
                "output_mapping": {"vat_amount": "vat"},
                "dependencies": ["scan"]
            }
        ]
    });

    let (status, body) = post(
        &app,
        "/saved-workflows",
        json!({"template": template, "tenant_id": "acme"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["usage_count"], 0);

    let (status, _) = post(
        &app,
        "/saved-workflows",
        json!({"template": template, "tenant_id": "acme"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&app, "/templates").await;
    assert_eq!(body["total"], 4);

    let (_, body) = post(
        &app,
        "/workflows/execute",
        json!({"template_id": "receipt_vat", "initial_variables": {"file": "r.pdf"}}),
    )
    .await;
    assert_eq!(body["status"], "completed");

    let (_, body) = get(&app, "/saved-workflows?tenant_id=acme").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["saved_workflows"][0]["usage_count"], 1);

    let (_, body) = get(&app, "/saved-workflows?tenant_id=globex").await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_saved_workflow_with_unmet_dependencies_is_rejected() {
    let app = create_test_app().await;
    let template = json!({
        "template_id": "analysis_only",
        "name": "Analysis only",
        "steps": [{"step_id": "analyse", "agent_id": "finance_analysis"}]
    });

    let (status, body) = post(&app, "/saved-workflows", json!({"template": template})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("requires"));

    let cyclic = json!({
        "template_id": "loop",
        "name": "Loop",
        "steps": [
            {"step_id": "a", "agent_id": "ocr_extract", "dependencies": ["b"]},
            {"step_id": "b", "agent_id": "manual_review", "dependencies": ["a"]}
        ]
    });
    let (status, _) = post(&app, "/saved-workflows", json!({"template": cyclic})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
