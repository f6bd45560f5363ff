// HTTP surface: page, JSON API and monitoring endpoints

pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::Config;
use crate::orchestration::{Analyzer, SessionStore};
use crate::utils::Metrics;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub analyzer: Arc<Analyzer>,
    pub sessions: SessionStore,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Arc<Config>, analyzer: Arc<Analyzer>, metrics: Metrics) -> Self {
        Self {
            sessions: SessionStore::new(Some(metrics.clone())),
            config,
            analyzer,
            metrics,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/analyze", post(handlers::analyze_page))
        .route("/api/analyze", post(handlers::analyze_json))
        .route("/reset", post(handlers::reset_page))
        .route("/api/reset", post(handlers::reset_json))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/stats", get(handlers::stats_endpoint))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Routes listed at startup
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/", "Classifier page"),
    ("POST", "/analyze", "Analyze images (multipart/form-data), HTML"),
    ("POST", "/api/analyze", "Analyze images (multipart/form-data), JSON"),
    ("POST", "/reset", "Clear results and inputs, redirect to /"),
    ("POST", "/api/reset", "Clear results and inputs, JSON"),
    ("GET", "/health", "Health check"),
    ("GET", "/metrics", "Prometheus metrics"),
    ("GET", "/stats", "Detailed statistics"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::services::classification::testing::StubClassifier;
    use crate::services::translation::testing::StubTranslator;
    use crate::services::translation::LabelTranslator;
    use crate::utils::image_ops::solid_png;

    const BOUNDARY: &str = "classifier-test-boundary";

    fn app() -> Router {
        fixture().0
    }

    fn fixture() -> (Router, Metrics) {
        let metrics = Metrics::new();
        let config = Arc::new(Config::for_tests());
        let labels = LabelTranslator::new(
            Arc::new(StubTranslator::with_dictionary(&[("tabby, tabby cat", "얼룩 고양이")])),
            Some(metrics.clone()),
        );
        let analyzer = Arc::new(Analyzer::new(
            Arc::new(StubClassifier::tabby()),
            labels,
            metrics.clone(),
            config.display.thumbnail_max_width,
        ));
        (build_router(AppState::new(config, analyzer, metrics.clone())), metrics)
    }

    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, file_name, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, field, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn analyze_request(cookie: Option<&str>, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        multipart_request("/api/analyze", cookie, parts)
    }

    fn multipart_request(
        uri: &str,
        cookie: Option<&str>,
        parts: &[(&str, &str, &[u8])],
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(multipart_body(parts))).unwrap()
    }

    fn session_cookie(response: &axum::response::Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("new session sets a cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn html_body(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_index(cookie: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_starts_session_with_epoch_zero_widgets() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).starts_with("classifier_session="));

        let html = html_body(response).await;
        assert!(html.contains("name=\"uploader_0\""));
        assert!(html.contains("name=\"camera_0\""));
    }

    #[tokio::test]
    async fn test_analyze_json_reports_top_label() {
        let png = solid_png(8, 8, [200, 150, 100]);
        let response = app()
            .oneshot(analyze_request(None, &[("uploader_0", "cat.png", png.as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["total_images"], 1);
        assert_eq!(report["images"][0]["heading"], "😎 🐱 얼룩 고양이");
        assert_eq!(
            report["images"][0]["image_id"],
            format!("cat.png_{}", png.len())
        );
        assert_eq!(report["images"][0]["chart"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_analyze_page_renders_chart() {
        let png = solid_png(8, 8, [200, 150, 100]);
        let response = app()
            .oneshot(multipart_request(
                "/analyze",
                None,
                &[("uploader_0", "cat.png", png.as_slice())],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = html_body(response).await;
        assert!(html.contains("😎 🐱 얼룩 고양이"));
        assert!(html.contains("(tabby, tabby cat) - confidence: 92.00%"));
        assert_eq!(html.matches("class=\"bar-row\"").count(), 5);
    }

    #[tokio::test]
    async fn test_camera_capture_keeps_earlier_upload() {
        let (app, metrics) = fixture();
        let photo = solid_png(8, 8, [200, 150, 100]);
        let capture = solid_png(6, 6, [10, 20, 30]);

        let response = app
            .clone()
            .oneshot(analyze_request(None, &[("uploader_0", "cat.png", photo.as_slice())]))
            .await
            .unwrap();
        let cookie = session_cookie(&response);
        assert_eq!(json_body(response).await["total_images"], 1);

        // The uploader comes back empty while the camera gets a capture
        let response = app
            .oneshot(analyze_request(
                Some(&cookie),
                &[
                    ("uploader_0", "", &b""[..]),
                    ("camera_0", "capture.png", capture.as_slice()),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["total_images"], 2);
        assert_eq!(report["images"][0]["image_id"], format!("cat.png_{}", photo.len()));
        assert_eq!(report["images"][1]["image_id"], "camera_0_1");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 2);
    }

    #[tokio::test]
    async fn test_index_shows_results_until_reset() {
        let app = app();
        let png = solid_png(8, 8, [200, 150, 100]);

        let response = app
            .clone()
            .oneshot(analyze_request(None, &[("uploader_0", "cat.png", png.as_slice())]))
            .await
            .unwrap();
        let cookie = session_cookie(&response);

        let html = html_body(app.clone().oneshot(get_index(&cookie)).await.unwrap()).await;
        assert!(html.contains("Analyzing 1 image."));
        assert!(html.contains("😎 🐱 얼룩 고양이"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reset")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = app.oneshot(get_index(&cookie)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = html_body(response).await;
        assert!(!html.contains("Analyzing"));
        assert!(html.contains("name=\"uploader_1\""));
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_bad_request() {
        let response = app()
            .oneshot(analyze_request(None, &[("uploader_0", "cat.png", &b"garbage"[..])]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disallowed_extension_is_bad_request() {
        let response = app()
            .oneshot(analyze_request(None, &[("uploader_0", "cat.gif", &b"GIF89a"[..])]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_retires_old_widget_names() {
        let app = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = session_cookie(&response);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/reset")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let reset = json_body(response).await;
        assert_eq!(reset["epoch"], 1);
        assert_eq!(reset["widget_keys"]["uploader"], "uploader_1");

        // A form rendered before the reset is ignored
        let png = solid_png(8, 8, [1, 1, 1]);
        let response = app
            .clone()
            .oneshot(analyze_request(Some(&cookie), &[("uploader_0", "cat.png", png.as_slice())]))
            .await
            .unwrap();
        let report = json_body(response).await;
        assert_eq!(report["epoch"], 1);
        assert_eq!(report["total_images"], 0);

        let response = app
            .oneshot(analyze_request(Some(&cookie), &[("uploader_1", "cat.png", png.as_slice())]))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["total_images"], 1);
    }

    #[tokio::test]
    async fn test_reset_page_redirects_home() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_health_names_backend() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health = json_body(response).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["classifier"], "stub");
    }
}
