use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use super::AppState;
use crate::ranking::DoctorPrediction;

pub(super) const MSG_FOUND: &str = "Doctors found.";
pub(super) const MSG_NONE: &str = "No doctors available at the specified time.";
pub(super) const MSG_TIME_REQUIRED: &str = "Time parameter is required";
pub(super) const MSG_INTERNAL: &str = "An error occurred processing your request.";

#[derive(Debug, Serialize)]
struct DoctorsResponse {
    message: &'static str,
    doctors: Vec<DoctorPrediction>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Signed integer `limit`; absent or non-integer values fall back to `default`.
fn parse_limit(raw: Option<&String>, default: usize) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or_else(|| i64::try_from(default).unwrap_or(i64::MAX))
}

pub(super) async fn get_doctors_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(time) = params.get("time").filter(|value| !value.is_empty()).cloned() else {
        return error_response(StatusCode::BAD_REQUEST, MSG_TIME_REQUIRED);
    };
    let limit = parse_limit(params.get("limit"), state.settings.default_limit);
    debug!(%time, limit, "get_doctors");

    let engine = Arc::clone(&state.engine);
    match state
        .pool
        .run(move || engine.predict_best_doctors(&time, limit))
        .await
    {
        Ok(outcome) => {
            let doctors = outcome.into_doctors();
            let message = if doctors.is_empty() { MSG_NONE } else { MSG_FOUND };
            Json(DoctorsResponse { message, doctors }).into_response()
        }
        Err(err) => {
            error!("Error processing get_doctors request: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
        }
    }
}

pub(super) async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
