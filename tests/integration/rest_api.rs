//! Integration tests for the REST API.
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`,
//! so no socket is opened.
//!
//! Verification command: `cargo test --test rest_api`

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kanban_proto::ids::UserId;
use kanban_server::server::{AppState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

struct Caller {
    id: UserId,
    name: &'static str,
    email: String,
}

impl Caller {
    fn new(name: &'static str) -> Self {
        Self {
            id: UserId::new(),
            name,
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }
}

fn app() -> Router {
    build_router(AppState::in_memory())
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<&Caller>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = caller {
        builder = builder
            .header("x-user-id", c.id.to_string())
            .header("x-user-name", c.name)
            .header("x-user-email", c.email.as_str());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_project(app: &Router, owner: &Caller, name: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/api/projects",
        Some(owner),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_task(app: &Router, who: &Caller, project: &str, title: &str, column: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/tasks",
        Some(who),
        Some(json!({ "title": title, "project": project, "column": column })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn error_fields(body: &Value) -> Vec<String> {
    body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn health_needs_no_identity() {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = app();
    let (status, _) = call(&app, "GET", "/api/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn project_lifecycle() {
    let app = app();
    let ann = Caller::new("Ann");
    let id = create_project(&app, &ann, "Roadmap").await;

    let (status, body) = call(&app, "GET", "/api/projects", Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["owner"]["name"], "Ann");
    assert_eq!(body[0]["color"], "#6366f1");

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/projects/{id}"),
        Some(&ann),
        Some(json!({ "description": "Q3 plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Q3 plans");

    let (status, _) = call(&app, "DELETE", &format!("/api/projects/{id}"), Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", &format!("/api/projects/{id}"), Some(&ann), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "project not found");
}

#[tokio::test]
async fn project_requires_name() {
    let app = app();
    let ann = Caller::new("Ann");
    let (status, body) = call(&app, "POST", "/api/projects", Some(&ann), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), vec!["name"]);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app();
    let ann = Caller::new("Ann");
    let request = Request::builder()
        .method("POST")
        .uri("/api/projects")
        .header("x-user-id", ann.id.to_string())
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error_fields(&body), vec!["body"]);
}

#[tokio::test]
async fn members_see_shared_projects() {
    let app = app();
    let ann = Caller::new("Ann");
    let bob = Caller::new("Bob");
    let id = create_project(&app, &ann, "Roadmap").await;

    // Bob must have called the API once to be known by email.
    call(&app, "GET", "/api/projects", Some(&bob), None).await;

    let (status, _) = call(&app, "GET", &format!("/api/tasks/project/{id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/projects/{id}/members"),
        Some(&ann),
        Some(json!({ "email": "bob@example.com", "role": "member" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["members"][0]["user"]["name"], "Bob");

    let (status, _) = call(&app, "GET", &format!("/api/tasks/project/{id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "DELETE", &format!("/api/projects/{id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access denied");

    let (status, body) = call(
        &app,
        "DELETE",
        &format!("/api/projects/{id}/members/{}", bob.id),
        Some(&ann),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["members"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn move_endpoint() {
    let app = app();
    let ann = Caller::new("Ann");
    let eve = Caller::new("Eve");
    let project = create_project(&app, &ann, "Roadmap").await;
    let x = create_task(&app, &ann, &project, "X", "todo").await;
    let y = create_task(&app, &ann, &project, "Y", "todo").await;
    assert_eq!(x["position"], 0);
    assert_eq!(y["position"], 1);
    let y_id = y["id"].as_str().unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{y_id}/move"),
        Some(&ann),
        Some(json!({ "column": "doing", "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["column"], "doing");
    assert_eq!(body["position"], 0);
    assert_eq!(body["createdBy"]["name"], "Ann");

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{y_id}/move"),
        Some(&ann),
        Some(json!({ "column": "blocked", "position": "first" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), vec!["column", "position"]);

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{y_id}/move"),
        Some(&eve),
        Some(json!({ "column": "done", "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{}/move", UserId::new()),
        Some(&ann),
        Some(json!({ "column": "done", "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_listing_is_ordered() {
    let app = app();
    let ann = Caller::new("Ann");
    let project = create_project(&app, &ann, "Roadmap").await;
    create_task(&app, &ann, &project, "D", "done").await;
    create_task(&app, &ann, &project, "T1", "todo").await;
    create_task(&app, &ann, &project, "G", "doing").await;
    create_task(&app, &ann, &project, "T2", "todo").await;

    let (status, body) = call(&app, "GET", &format!("/api/tasks/project/{project}"), Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["T1", "T2", "G", "D"]);
}

#[tokio::test]
async fn delete_task_compacts() {
    let app = app();
    let ann = Caller::new("Ann");
    let project = create_project(&app, &ann, "Roadmap").await;
    let x = create_task(&app, &ann, &project, "X", "todo").await;
    create_task(&app, &ann, &project, "Y", "todo").await;

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/api/tasks/{}", x["id"].as_str().unwrap()),
        Some(&ann),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", &format!("/api/tasks/project/{project}"), Some(&ann), None).await;
    assert_eq!(body[0]["title"], "Y");
    assert_eq!(body[0]["position"], 0);
}

#[tokio::test]
async fn update_and_comment() {
    let app = app();
    let ann = Caller::new("Ann");
    let project = create_project(&app, &ann, "Roadmap").await;
    let task = create_task(&app, &ann, &project, "X", "todo").await;
    let id = task["id"].as_str().unwrap();

    let (status, body) = call(
        &app,
        "PUT",
        &format!("/api/tasks/{id}"),
        Some(&ann),
        Some(json!({ "title": "X2", "priority": "high", "column": "done" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["title"], "X2");
    assert_eq!(body["priority"], "high");
    assert_eq!(body["column"], "todo");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/tasks/{id}/comments"),
        Some(&ann),
        Some(json!({ "text": "first" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["comments"][0]["text"], "first");
    assert_eq!(body["comments"][0]["user"]["name"], "Ann");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/tasks/{id}/comments"),
        Some(&ann),
        Some(json!({ "text": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), vec!["text"]);
}

#[tokio::test]
async fn user_search() {
    let app = app();
    let ann = Caller::new("Ann");
    let annika = Caller::new("Annika");
    call(&app, "GET", "/api/projects", Some(&annika), None).await;

    let (status, body) = call(&app, "GET", "/api/users/search?q=a", Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = call(&app, "GET", "/api/users/search?q=ann", Some(&ann), None).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Annika"]);
}

#[tokio::test]
async fn notification_endpoints() {
    let app = app();
    let ann = Caller::new("Ann");

    let (status, body) = call(&app, "GET", "/api/users/notifications", Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = call(&app, "PUT", "/api/users/notifications/read", Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 0);

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/users/notifications/{}/read", UserId::new()),
        Some(&ann),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
