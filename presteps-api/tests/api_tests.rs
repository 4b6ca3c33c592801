//! Tests for the HTTP endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use presteps_api::{app, app_with_settings, CurateResponse};
use presteps_test_suite::utils::single_line_pdf;
use presteps_test_suite::{invalid_pdfs, TestPdfBuilder};
use presteps::ExtractionSettings;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "presteps-boundary";

fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(app: Router, file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Response {
    app.oneshot(
        Request::builder()
            .uri("/api/extract")
            .method("POST")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(file, fields)))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn post_json(app: Router, uri: &str, body: &Value) -> Response {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = app()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "presteps API");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_extract_returns_structured_document() {
    let pdf = single_line_pdf("Scope one emissions were 120 tCO2e", 12.0);
    let response = upload(app(), Some(("report.pdf", &pdf)), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["source"], "report.pdf");
    assert_eq!(json["page_count"], 1);
    assert_eq!(json["paragraphs"][0]["text"], "Scope one emissions were 120 tCO2e");
    assert_eq!(json["paragraphs"][0]["page"], 0);
    assert!(json["created_at"].is_string());
}

#[tokio::test]
async fn test_extract_min_paragraph_length_field() {
    let pdf = single_line_pdf("Short note", 12.0);

    let filtered = json_body(upload(app(), Some(("note.pdf", &pdf)), &[]).await).await;
    assert_eq!(filtered["paragraphs"], json!([]));

    let kept = json_body(upload(app(), Some(("note.pdf", &pdf)), &[("min_paragraph_length", "0")]).await).await;
    assert_eq!(kept["paragraphs"][0]["text"], "Short note");
}

#[tokio::test]
async fn test_extract_uses_server_settings() {
    let settings = ExtractionSettings {
        min_paragraph_length: 0,
        ..ExtractionSettings::default()
    };
    let pdf = single_line_pdf("Short note", 12.0);
    let json = json_body(upload(app_with_settings(settings), Some(("note.pdf", &pdf)), &[]).await).await;
    assert_eq!(json["paragraphs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_extract_without_file() {
    let response = upload(app(), None, &[("force", "true")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file provided in upload");
}

#[tokio::test]
async fn test_extract_rejects_bad_documents() {
    let garbage = invalid_pdfs::garbage();
    let response = upload(app(), Some(("broken.pdf", &garbage)), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("broken.pdf: not a readable PDF"), "{error}");

    let response = upload(app(), Some(("empty.pdf", b"")), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "empty.pdf: empty input");
}

#[tokio::test]
async fn test_extract_encrypted_requires_force() {
    let mut builder = TestPdfBuilder::new().with_encryption();
    builder.add_text_page("Confidential figures", 12.0);
    let pdf = builder.build();

    let response = upload(app(), Some(("secret.pdf", &pdf)), &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("password-protected"), "{error}");

    let response = upload(app(), Some(("secret.pdf", &pdf)), &[("force", "maybe")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_curate_extracted_document() {
    let pdf = single_line_pdf("Total emissions were 120 tCO2e in the year", 12.0);
    let document = json_body(upload(app(), Some(("acme_2022.pdf", &pdf)), &[]).await).await;

    let request = json!({
        "document": document,
        "annotations": [
            {"question_id": "Q1", "expected_answer": "120 tCO2e", "source_document": "ACME_2022.pdf"},
            {"question_id": "Q2", "expected_answer": "board oversight"},
        ],
    });
    let response = post_json(app(), "/api/curate", &request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let curated: CurateResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(curated.positive, 1);
    assert_eq!(curated.ambiguous, 0);
    assert_eq!(curated.records.len(), curated.positive + curated.negative);

    let positive = curated.records.iter().find(|r| r.question_id == "Q1").unwrap();
    assert_eq!(positive.score, 1.0);
    assert_eq!(positive.answer_start, vec![21]);
}

#[tokio::test]
async fn test_curate_rejects_invalid_input() {
    let document = json!({
        "source": "acme.pdf",
        "page_count": 1,
        "created_at": "2024-05-01T10:00:00Z",
        "paragraphs": [
            {"page": 3, "text": "Out of range", "bbox": [0.0, 0.0, 10.0, 10.0], "font": "Helvetica", "font_size": 10.0}
        ],
    });
    let request = json!({"document": document, "annotations": []});
    let response = post_json(app(), "/api/curate", &request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("out of range"));

    let request = json!({
        "document": {"source": "a.pdf", "page_count": 1, "created_at": "2024-05-01T10:00:00Z", "paragraphs": []},
        "annotations": [],
        "config": {"thresholds": {"low": 0.9, "high": 0.2}},
    });
    let response = post_json(app(), "/api/curate", &request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("low threshold"));
}

#[tokio::test]
async fn test_404_not_found() {
    let response = app()
        .oneshot(Request::builder().uri("/api/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
