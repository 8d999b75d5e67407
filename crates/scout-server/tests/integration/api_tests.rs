//! End-to-end tests of the REST API.

use axum::http::{StatusCode, header};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{
    ADMIN_TOKEN, UNREACHABLE_ENDPOINT, body_json, empty_request, json_request, send, test_router,
    test_state,
};

fn create_body() -> serde_json::Value {
    json!({
        "location": "Berlin",
        "date": "2024-01-15",
        "categories": ["Konzerte", "theatre"]
    })
}

#[tokio::test]
async fn test_health_reports_storage() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));

    // Act
    let response = send(&router, empty_request("GET", "/api/v1/health")).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["healthy"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_create_job_then_duplicate() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));

    // Act
    let first = send(&router, json_request("POST", "/api/v1/jobs", create_body())).await;
    let first_status = first.status();
    let first = body_json(first).await;

    let second = send(
        &router,
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "location": "  berlin ",
                "date": "2024-01-15",
                "categories": ["Theater", "Live Music"]
            }),
        ),
    )
    .await;
    let second_status = second.status();
    let second = body_json(second).await;

    // Assert
    assert_eq!(first_status, StatusCode::ACCEPTED);
    assert_eq!(first["is_new"], true);
    assert_eq!(first["job"]["status"], "PENDING");
    assert_eq!(first["job"]["total_categories"], 2);
    assert_eq!(first["job"]["categories"][0]["name"], "Live Music");
    assert_eq!(first["job"]["categories"][1]["name"], "Theater");
    assert_eq!(first["job"]["categories"][0]["state"], "NOT_STARTED");

    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["is_new"], false);
    assert_eq!(second["job"]["job_id"], first["job"]["job_id"]);
}

#[tokio::test]
async fn test_create_job_validation_error() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));

    // Act
    let response = send(
        &router,
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({"location": "Berlin", "date": "15.01.2024", "categories": ["Theater"]}),
        ),
    )
    .await;

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");

    let queue = body_json(send(&router, empty_request("GET", "/api/v1/queue")).await).await;
    assert_eq!(queue["pending_jobs"], 0);
}

#[tokio::test]
async fn test_get_job_roundtrip_and_not_found() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));
    let created = body_json(send(&router, json_request("POST", "/api/v1/jobs", create_body())).await).await;
    let id = created["job"]["job_id"].as_str().unwrap().to_string();

    // Act
    let found = send(&router, empty_request("GET", &format!("/api/v1/jobs/{id}"))).await;
    let missing = send(
        &router,
        empty_request("GET", "/api/v1/jobs/00000000-0000-4000-8000-000000000000"),
    )
    .await;
    let malformed = send(&router, empty_request("GET", "/api/v1/jobs/not-a-uuid")).await;

    // Assert
    assert_eq!(found.status(), StatusCode::OK);
    assert_eq!(body_json(found).await["location"], "Berlin");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_job_twice() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));
    let created = body_json(send(&router, json_request("POST", "/api/v1/jobs", create_body())).await).await;
    let id = created["job"]["job_id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/jobs/{id}/cancel");

    // Act
    let first = send(&router, empty_request("POST", &uri)).await;
    let first_status = first.status();
    let first = body_json(first).await;
    let second = send(&router, empty_request("POST", &uri)).await;

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first["status"], "CANCELLED");
    assert_eq!(first["error"], "Cancelled by user");
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queue_counts_new_jobs() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));
    send(&router, json_request("POST", "/api/v1/jobs", create_body())).await;
    send(&router, json_request("POST", "/api/v1/jobs", create_body())).await;

    // Act
    let response = send(&router, empty_request("GET", "/api/v1/queue")).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["pending_jobs"], 1);
}

#[tokio::test]
async fn test_batch_run_disabled_without_admin_token() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));

    // Act
    let response = send(&router, empty_request("POST", "/api/v1/batch/run")).await;

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "forbidden");
}

#[tokio::test]
async fn test_batch_run_rejects_wrong_token() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, Some(ADMIN_TOKEN)));
    let mut request = empty_request("POST", "/api/v1/batch/run");
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());

    // Act
    let response = send(&router, request).await;

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_batch_run_rejects_missing_bearer() {
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, Some(ADMIN_TOKEN)));
    let mut request = empty_request("POST", "/api/v1/batch/run");
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, ADMIN_TOKEN.parse().unwrap());

    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_create_job_with_oversized_ttl_is_rejected() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));
    let mut body = create_body();
    body["ttl_seconds"] = json!(100_000_000_000_000u64);

    // Act
    let rejected = send(&router, json_request("POST", "/api/v1/jobs", body)).await;
    let accepted = send(&router, json_request("POST", "/api/v1/jobs", create_body())).await;

    // Assert
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_batch_run_processes_queued_job() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"title": "Gig"}, {"title": "Play"}]
        })))
        .mount(&server)
        .await;

    let router = test_router(test_state(
        &format!("{}/search", server.uri()),
        Some(ADMIN_TOKEN),
    ));
    let created = body_json(send(&router, json_request("POST", "/api/v1/jobs", create_body())).await).await;
    let id = created["job"]["job_id"].as_str().unwrap().to_string();

    let mut request = empty_request("POST", "/api/v1/batch/run");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {ADMIN_TOKEN}").parse().unwrap(),
    );

    // Act
    let response = send(&router, request).await;
    let response_status = response.status();
    let summary = body_json(response).await;
    let job = body_json(send(&router, empty_request("GET", &format!("/api/v1/jobs/{id}"))).await).await;

    // Assert
    assert_eq!(response_status, StatusCode::OK);
    assert_eq!(summary["started"], true);
    assert_eq!(summary["processed_jobs"], 1);
    assert_eq!(job["status"], "SUCCESS");
    assert_eq!(job["completed_categories"], 2);
    assert_eq!(job["results"].as_array().unwrap().len(), 4);
    assert!(job["completed_at"].is_string());
}

#[tokio::test]
async fn test_batch_run_with_unreachable_provider_fails_job() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, Some(ADMIN_TOKEN)));
    let created = body_json(send(&router, json_request("POST", "/api/v1/jobs", create_body())).await).await;
    let id = created["job"]["job_id"].as_str().unwrap().to_string();

    let mut request = empty_request("POST", "/api/v1/batch/run");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {ADMIN_TOKEN}").parse().unwrap(),
    );

    // Act
    let response = send(&router, request).await;
    let job = body_json(send(&router, empty_request("GET", &format!("/api/v1/jobs/{id}"))).await).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(job["status"], "FAILED");
    assert_eq!(job["failed_categories"], 2);
    assert!(job["error"].as_str().unwrap().starts_with("2 of 2 categories failed"));
}

#[tokio::test]
async fn test_openapi_document_lists_paths() {
    // Arrange
    let router = test_router(test_state(UNREACHABLE_ENDPOINT, None));

    // Act
    let response = send(&router, empty_request("GET", "/api-docs/openapi.json")).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert_eq!(doc["info"]["title"], "Scout API");
    assert!(doc["paths"]["/api/v1/jobs"].is_object());
    assert!(doc["paths"]["/api/v1/jobs/{id}/cancel"].is_object());
    assert!(doc["paths"]["/api/v1/batch/run"].is_object());
}
