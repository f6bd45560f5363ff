use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::AppState;
use crate::core::errors::{AnalysisError, InputError};
use crate::core::types::{AnalysisReport, ImageReport, WidgetKeys};
use crate::orchestration::{InputCollector, SessionHandle, SessionState};
use crate::services::presentation::html::{render_page, PageView};

type ApiError = (StatusCode, String);

/// Session cookie value from the request, if present
fn session_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
}

fn resolve_session(state: &AppState, headers: &HeaderMap) -> (String, Arc<SessionHandle>, bool) {
    let cookie_name = &state.config.session.cookie_name;
    state
        .sessions
        .get_or_create(session_cookie(headers, cookie_name))
}

/// Attach `Set-Cookie` when the session was just created
fn with_session_cookie(
    state: &AppState,
    mut response: Response,
    session_id: &str,
    created: bool,
) -> Response {
    if !created {
        return response;
    }
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        state.config.session.cookie_name, session_id
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Could not build session cookie: {}", e),
    }
    response
}

fn multipart_rejection(e: MultipartError) -> ApiError {
    (e.status(), InputError::Multipart(e.body_text()).to_string())
}

fn input_rejection(e: InputError) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn analysis_rejection(e: AnalysisError) -> ApiError {
    if e.is_client_error() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error!("Analysis failed: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// Re-render whatever the session's widgets hold. Seen images come from
/// the cache.
async fn analyze_current(
    app: &AppState,
    session: &mut SessionState,
) -> Result<AnalysisReport, ApiError> {
    let images = session.current_images();
    app.analyzer
        .analyze(session, images)
        .await
        .map_err(analysis_rejection)
}

/// One interaction cycle: apply the epoch's widget fields to the session,
/// then analyze everything the widgets now hold.
///
/// Runs with the session locked, so cycles of one session never interleave.
/// A rejected submission leaves the widgets untouched.
async fn run_interaction(
    app: &AppState,
    session: &mut SessionState,
    mut multipart: Multipart,
) -> Result<AnalysisReport, ApiError> {
    let mut collector =
        InputCollector::new(session.epoch(), &app.config.upload.allowed_extensions);

    while let Some(field) = multipart.next_field().await.map_err(multipart_rejection)? {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_rejection)?;

        collector
            .accept_field(&name, file_name.as_deref(), data.to_vec())
            .map_err(input_rejection)?;
    }

    if collector.ignored_fields() > 0 {
        info!(
            "Ignored {} field(s) not matching epoch {}",
            collector.ignored_fields(),
            session.epoch()
        );
    }

    session.apply_input(collector.finish());
    analyze_current(app, session).await
}

fn page(app: &AppState, session: &SessionState, reports: &[ImageReport], error: Option<&str>) -> Html<String> {
    let keys = session.widget_keys();
    let accept = app
        .config
        .upload
        .allowed_extensions
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    Html(render_page(&PageView {
        widget_keys: &keys,
        reports,
        error,
        chart_color: &app.config.display.chart_color,
        accept: &accept,
        model_id: &app.config.classifier.model_id,
    }))
}

pub async fn index(State(app): State<AppState>, headers: HeaderMap) -> Response {
    app.metrics.record_endpoint_request("/");
    let (session_id, handle, created) = resolve_session(&app, &headers);
    let mut session = handle.lock().await;

    let response = if session.current_images().is_empty() {
        page(&app, &session, &[], None).into_response()
    } else {
        match analyze_current(&app, &mut session).await {
            Ok(report) => page(&app, &session, &report.images, None).into_response(),
            Err((status, message)) => {
                (status, page(&app, &session, &[], Some(message.as_str()))).into_response()
            }
        }
    };
    with_session_cookie(&app, response, &session_id, created)
}

/// Analyze and render the page with results (or the error banner)
pub async fn analyze_page(
    State(app): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    app.metrics.record_endpoint_request("/analyze");
    let (session_id, handle, created) = resolve_session(&app, &headers);
    let mut session = handle.lock().await;

    let response = match run_interaction(&app, &mut session, multipart).await {
        Ok(report) => page(&app, &session, &report.images, None).into_response(),
        Err((status, message)) => {
            (status, page(&app, &session, &[], Some(message.as_str()))).into_response()
        }
    };
    with_session_cookie(&app, response, &session_id, created)
}

/// Analyze images
///
/// # Request Format:
/// - multipart/form-data
/// - Fields `uploader_{epoch}`: zero or more image files (jpg/jpeg/png)
/// - Field `camera_{epoch}` (optional): one captured image
///
/// # Response:
/// - `AnalysisReport` JSON
pub async fn analyze_json(
    State(app): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    app.metrics.record_endpoint_request("/api/analyze");
    let (session_id, handle, created) = resolve_session(&app, &headers);
    let mut session = handle.lock().await;

    let response = match run_interaction(&app, &mut session, multipart).await {
        Ok(report) => Json(report).into_response(),
        Err(rejection) => rejection.into_response(),
    };
    with_session_cookie(&app, response, &session_id, created)
}

/// Clear the session's results and advance its epoch. Returns the new epoch.
async fn reset_session(app: &AppState, handle: &SessionHandle) -> u64 {
    let epoch = handle.lock().await.reset();
    app.metrics.record_reset();
    info!("Session reset, epoch now {}", epoch);
    epoch
}

pub async fn reset_page(State(app): State<AppState>, headers: HeaderMap) -> Response {
    app.metrics.record_endpoint_request("/reset");
    let (session_id, handle, created) = resolve_session(&app, &headers);
    reset_session(&app, &handle).await;

    let response = Redirect::to("/").into_response();
    with_session_cookie(&app, response, &session_id, created)
}

pub async fn reset_json(State(app): State<AppState>, headers: HeaderMap) -> Response {
    app.metrics.record_endpoint_request("/api/reset");
    let (session_id, handle, created) = resolve_session(&app, &headers);
    let epoch = reset_session(&app, &handle).await;

    let response = Json(serde_json::json!({
        "epoch": epoch,
        "widget_keys": WidgetKeys::for_epoch(epoch),
    }))
    .into_response();
    with_session_cookie(&app, response, &session_id, created)
}

pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "classifier": app.analyzer.backend_name(),
        "model_id": app.config.classifier.model_id,
        "active_sessions": app.sessions.len(),
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint(State(app): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        app.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
pub async fn stats_endpoint(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = app.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}
