pub mod health;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::batch::handlers as batch;
use crate::labels::handlers as labels;
use crate::state::AppState;

/// Spreadsheet uploads may exceed axum's 2 MB default.
const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Labels API
        .route("/api/v1/labels/sizes", post(labels::handle_sizes))
        .route("/api/v1/labels/preview", post(labels::handle_preview))
        .route(
            "/api/v1/labels/preview.html",
            post(labels::handle_preview_html),
        )
        .route("/api/v1/labels/pdf", post(labels::handle_pdf))
        .route(
            "/api/v1/buckets/:width_cm/:height_cm",
            get(labels::handle_bucket_lookup),
        )
        // Batch API
        .route(
            "/api/v1/batch",
            post(batch::handle_upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route(
            "/api/v1/batch/template.csv",
            get(batch::handle_template_csv),
        )
        .route(
            "/api/v1/batch/template.xlsx",
            get(batch::handle_template_xlsx),
        )
        .route("/api/v1/batch/:id/status", get(batch::handle_status))
        .route("/api/v1/batch/:id/run", post(batch::handle_run))
        .route("/api/v1/batch/:id/abort", post(batch::handle_abort))
        .route("/api/v1/batch/:id/download", get(batch::handle_download))
        .with_state(state)
}

/// Attachment response with an ASCII fallback name and an RFC 5987 `filename*`.
pub fn file_response(file_name: &str, content_type: &str, body: impl Into<Body>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_file_name(file_name),
        percent_encode(file_name)
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body.into(),
    )
        .into_response()
}

fn ascii_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect()
}

fn percent_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::batch::mapping::template_csv;
    use crate::batch::registry::BatchRegistry;
    use crate::config::Config;
    use crate::layout::buckets::BucketTable;
    use crate::render::PdfExporter;

    fn test_state() -> AppState {
        AppState {
            config: Config::from_lookup(|_| None).unwrap(),
            buckets: Arc::new(BucketTable::empty()),
            exporter: Arc::new(PdfExporter),
            batches: BatchRegistry::new(),
        }
    }

    fn label_body() -> Value {
        json!({
            "values": {
                "code": "LG1000843",
                "desc": "Combination Lock - Orange - 1 Pack (YF20610B)",
                "ean": "8719632951889",
                "qty": "12",
                "gw": "18,00",
                "cbm": "0.02",
                "len": 39.0,
                "wid": 19.5,
                "hei": 22.0,
                "batch": "IOR2500307"
            }
        })
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_upload(file_name: &str, content: &str) -> Request<Body> {
        let boundary = "X-LABEL-BOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n--{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/api/v1/batch")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    #[test]
    fn test_file_name_encoding() {
        assert_eq!(ascii_file_name("LG1 - é\".pdf"), "LG1 - __.pdf");
        assert_eq!(percent_encode("a b-é.pdf"), "a%20b-%C3%A9.pdf");
    }

    #[test]
    fn test_file_response_headers() {
        let response = file_response("LG1000843 - 2025-01-01 10-00-00.pdf", "application/pdf", vec![1u8]);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"LG1000843 - 2025-01-01 10-00-00.pdf\""));
        assert!(disposition.contains("filename*=UTF-8''LG1000843%20-%20"));
    }

    // ── labels ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_health() {
        let response = build_router(test_state()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_sizes_returns_four_faces() {
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/labels/sizes", &label_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let labels = body["labels"].as_array().unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0]["index"], 1);
        assert_eq!(body["largest_two"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_invalid_dimensions_rejected() {
        let mut body = label_body();
        body["values"]["hei"] = json!(0.0);
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/labels/preview", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].as_str().unwrap().contains("height"));
    }

    #[tokio::test]
    async fn test_preview_returns_fitted_sheet() {
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/labels/preview", &label_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["labels"].as_array().unwrap().len(), 4);
        assert_eq!(body["cancelled"], false);
        assert!(body["scale"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_preview_html() {
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/labels/preview.html", &label_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("LG1000843"));
    }

    #[tokio::test]
    async fn test_pdf_download() {
        let response = build_router(test_state())
            .oneshot(post_json("/api/v1/labels/pdf", &label_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("LG1000843 - "));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_bucket_lookup_without_table() {
        let response = build_router(test_state())
            .oneshot(get("/api/v1/buckets/39/22"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["key"], "LANDSCAPE_MEDIUM_STANDARD");
        assert_eq!(body["anchor"], Value::Null);
        assert_eq!(body["typography"], Value::Null);

        let response = build_router(test_state())
            .oneshot(get("/api/v1/buckets/0/22"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── batches ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_template_downloads() {
        let response = build_router(test_state())
            .oneshot(get("/api/v1/batch/template.csv"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"ERP;Omschrijving"));

        let response = build_router(test_state())
            .oneshot(get("/api/v1/batch/template.xlsx"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_unknown_batch_is_not_found() {
        let response = build_router(test_state())
            .oneshot(get(&format!("/api/v1/batch/{}/status", uuid::Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let boundary = "B";
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/batch")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{boundary}--\r\n"
            )))
            .unwrap();
        let response = build_router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_upload_run_and_download() {
        let app = build_router(test_state());

        let response = app
            .clone()
            .oneshot(multipart_upload("labels.csv", &template_csv()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let upload = json_body(response).await;
        assert_eq!(upload["total_rows"], 1);
        assert_eq!(upload["missing"], json!([]));
        let id = upload["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/batch/{id}/run"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let mut status = Value::Null;
        for _ in 0..500 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/v1/batch/{id}/status")))
                .await
                .unwrap();
            status = json_body(response).await;
            if status["phase"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status["phase"], "completed", "status: {status}");
        assert_eq!(status["succeeded"], 1);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/batch/{id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");

        // A finished batch cannot be started again.
        let response = app
            .oneshot(post_json(&format!("/api/v1/batch/{id}/run"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_upload_over_row_limit_rejected() {
        let mut state = test_state();
        state.config =
            Config::from_lookup(|key| (key == "BATCH_MAX_ROWS").then(|| "2".to_string())).unwrap();
        let app = build_router(state);

        let csv = "ERP;EAN\nLG1;1\nLG2;2\nLG3;3\n";
        let response = app.clone().oneshot(multipart_upload("labels.csv", csv)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("limit of 2"));

        let csv = "ERP;EAN\nLG1;1\nLG2;2\n";
        let response = app.oneshot(multipart_upload("labels.csv", csv)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_run_with_incomplete_mapping_rejected() {
        let app = build_router(test_state());
        let response = app
            .clone()
            .oneshot(multipart_upload("labels.csv", "ERP;EAN\nLG1;123\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let upload = json_body(response).await;
        assert!(!upload["missing"].as_array().unwrap().is_empty());
        let id = upload["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(post_json(&format!("/api/v1/batch/{id}/run"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
