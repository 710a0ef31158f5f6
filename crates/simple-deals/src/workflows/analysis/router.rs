use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::domain::UserQuery;
use super::history::HistoryId;
use super::service::PropertyAnalysisService;
use crate::workflows::documents::{flatten_text, DocumentKind, ReportService, TextExtractor};
use crate::workflows::search::domain::ListingRecord;
use crate::workflows::search::street_view::{parse_location, StreetViewSource};

const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;
/// Multipart field names an uploaded document may arrive under.
const UPLOAD_FIELDS: [&str; 2] = ["image", "file"];

/// Everything the HTTP handlers need, shared across requests.
#[derive(Clone)]
pub struct AnalysisState {
    pub analysis: Arc<PropertyAnalysisService>,
    pub extractor: Arc<dyn TextExtractor>,
    pub reports: Arc<ReportService>,
    pub street_view: Arc<dyn StreetViewSource>,
}

/// Router exposing question analysis, file analysis, reports, street view and history.
pub fn analysis_router(state: AnalysisState) -> Router {
    Router::new()
        .route("/api/v1/analyze-property", post(analyze_property_handler))
        .route(
            "/api/v1/analyze-file",
            post(analyze_file_handler).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/v1/streetview", post(street_view_handler))
        .route("/api/v1/get-report", post(report_handler))
        .route("/api/v1/gethistories", get(histories_handler))
        .route("/api/v1/gethistory", get(history_handler))
        .with_state(state)
}

pub(crate) async fn analyze_property_handler(
    State(state): State<AnalysisState>,
    body: Result<Json<UserQuery>, JsonRejection>,
) -> Response {
    let Json(query) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let payload = json!({ "message": rejection.body_text() });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match state.analysis.analyze(query).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn analyze_file_handler(
    State(state): State<AnalysisState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let no_file = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "result": "No file uploaded" })),
        )
            .into_response()
    };

    let Ok(mut multipart) = multipart else {
        return no_file();
    };

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name().is_some_and(|name| UPLOAD_FIELDS.contains(&name)) => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((content_type, bytes)),
                    Err(err) => warn!(error = %err, "upload could not be read"),
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "malformed multipart body");
                break;
            }
        }
    }

    let Some((content_type, bytes)) = upload.filter(|(_, bytes)| !bytes.is_empty()) else {
        return no_file();
    };

    let Some(kind) = DocumentKind::from_mime(&content_type) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "result": "Unsupported file type" })),
        )
            .into_response();
    };

    let text = match state.extractor.extract(kind, bytes.to_vec()).await {
        Ok(text) => flatten_text(&text),
        Err(err) => {
            error!(?kind, error = %err, "document extraction failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "result": "Error analyzing file" })),
            )
                .into_response();
        }
    };

    info!(?kind, chars = text.len(), "analyzing uploaded document");
    match state.analysis.answer(&text).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreetViewRequest {
    #[serde(default)]
    location: String,
}

pub(crate) async fn street_view_handler(
    State(state): State<AnalysisState>,
    body: Result<Json<StreetViewRequest>, JsonRejection>,
) -> Response {
    let location = body
        .ok()
        .and_then(|Json(request)| parse_location(&request.location));
    let Some(location) = location else {
        let payload = json!({ "error": "location must be an absolute http(s) URL" });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    };

    match state.street_view.fetch(&location).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => {
            error!(host = location.host_str().unwrap_or_default(), error = %err, "street view failed");
            let payload = json!({ "error": "Failed to get street view" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportRequest {
    listing: ListingRecord,
}

pub(crate) async fn report_handler(
    State(state): State<AnalysisState>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let payload = json!({ "error": rejection.body_text() });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match state.reports.generate(request.listing).await {
        Ok(report) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", report.filename),
                ),
            ],
            report.bytes,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "report generation failed");
            let payload = json!({ "error": "Failed to generate report" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoriesParams {
    #[serde(default)]
    email: String,
}

pub(crate) async fn histories_handler(
    State(state): State<AnalysisState>,
    Query(params): Query<HistoriesParams>,
) -> Response {
    let email = params.email.trim();
    if email.is_empty() {
        let payload = json!({ "message": "email is required" });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }

    match state.analysis.history().list_by_email(email) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => {
            error!(error = %err, "history listing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Get history error!")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryParams {
    #[serde(default)]
    id: String,
}

pub(crate) async fn history_handler(
    State(state): State<AnalysisState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let id = params.id.trim();
    if id.is_empty() {
        let payload = json!({ "message": "id is required" });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }

    match state.analysis.history().fetch(&HistoryId(id.to_string())) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => {
            let payload = json!({ "message": "History not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => {
            error!(%id, error = %err, "history lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Get a history error!")).into_response()
        }
    }
}
