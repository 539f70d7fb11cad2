pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::history::handlers as history;
use crate::screening::handlers as screening;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/screenings", post(screening::handle_screen))
        .route(
            "/api/v1/screenings/files",
            post(screening::handle_screen_files),
        )
        .route(
            "/api/v1/screenings/history",
            get(history::handle_list_history),
        )
        .route(
            "/api/v1/screenings/history/:id",
            get(history::handle_get_history),
        )
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{self, StubStages};

    const BOUNDARY: &str = "screener-test-boundary";

    fn app(stubs: StubStages) -> Router {
        build_router(testing::app_state(stubs).0)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// (field name, file name, content) parts.
    fn post_multipart(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_screen_then_fetch_history() {
        let stubs = StubStages::new(testing::requirements()).with_profile(
            "ada resume",
            testing::profile("Ada", &["Rust", "PostgreSQL"], Some("Acme"), 5.0),
        );
        let app = app(stubs);

        let (status, report) = send(
            &app,
            post_json(
                "/api/v1/screenings",
                json!({
                    "jd": {"jd_text": "Backend Engineer"},
                    "resumes": [{"resume_text": "ada resume"}, {"resume_text": "unknown"}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["ranked_candidates"][0]["rank"], 1);
        assert_eq!(report["ranked_candidates"][0]["candidate_name"], "Ada");
        assert_eq!(report["excluded_candidates"][0]["input_index"], 1);

        let request_id = report["processing_metadata"]["request_id"].as_str().unwrap();
        let (status, record) =
            send(&app, get(&format!("/api/v1/screenings/history/{request_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["processing_status"], "completed");

        let (status, list) = send(&app, get("/api/v1/screenings/history?limit=10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_screen_without_resumes_is_400() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(
            &app,
            post_json("/api/v1/screenings", json!({"jd": {"jd_text": "JD"}, "resumes": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_400() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/screenings",
                json!({
                    "jd": {"jd_text": "JD"},
                    "resumes": [{"resume_text": "r"}],
                    "model": {"provider": "openai"}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().contains("openai"));
    }

    #[tokio::test]
    async fn test_all_failed_is_422() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/screenings",
                json!({"jd": {"jd_text": "JD"}, "resumes": [{"resume_text": "nobody"}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "ALL_CANDIDATES_FAILED");
    }

    #[tokio::test]
    async fn test_screen_uploaded_files() {
        let stubs = StubStages::new(testing::requirements()).with_profile(
            "ada resume",
            testing::profile("Ada", &["Rust", "PostgreSQL"], Some("Acme"), 5.0),
        );
        let app = app(stubs);

        let (status, report) = send(
            &app,
            post_multipart(
                "/api/v1/screenings/files",
                &[
                    ("jd_file", Some("backend.txt"), b"Backend Engineer"),
                    ("resume_files", Some("ada.txt"), b"ada resume"),
                    ("resume_files", Some("unknown.md"), b"nobody"),
                    ("scoring_weights", None, br#"{"skills_match": 1, "relevant_experience": 1, "role_alignment": 1, "education_certifications": 1}"#),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{report}");
        assert_eq!(report["ranked_candidates"][0]["candidate_name"], "Ada");
        assert_eq!(report["excluded_candidates"][0]["candidate_name"], "unknown");
        assert_eq!(report["scoring_weights_used"]["skills_match"], 0.25);
    }

    #[tokio::test]
    async fn test_upload_with_unsupported_format_is_400() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(
            &app,
            post_multipart(
                "/api/v1/screenings/files",
                &[
                    ("jd_file", Some("jd.txt"), b"JD"),
                    ("resume_files", Some("cv.rtf"), b"{\\rtf1 Ada}"),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().contains("rtf"));
    }

    #[tokio::test]
    async fn test_upload_with_unknown_field_is_400() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, body) = send(
            &app,
            post_multipart(
                "/api/v1/screenings/files",
                &[("jd_file", Some("jd.txt"), b"JD"), ("avatar", Some("me.png"), b"png")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let app = app(StubStages::new(testing::requirements()));
        let big = "A".repeat(2 * 1024 * 1024);
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/screenings",
                json!({"jd": {"jd_text": "JD"}, "resumes": [{"resume_file": big, "file_format": "txt"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_history_id_is_404() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, _) = send(
            &app,
            get(&format!("/api/v1/screenings/history/{}", uuid::Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_limit_out_of_range_is_400() {
        let app = app(StubStages::new(testing::requirements()));
        let (status, _) = send(&app, get("/api/v1/screenings/history?limit=5000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
