use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::validate::validate_window;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

fn errors(status: StatusCode, reasons: Vec<String>) -> Response {
    (status, Json(json!({ "errors": reasons }))).into_response()
}

/// `POST /jobs` - accept a window once it is registered, not once the
/// backend is confirmed running.
pub async fn create(State(state): State<AppState>, Json(req): Json<ScheduleRequest>) -> Response {
    let window = match validate_window(
        &req.event_id,
        &req.start_time,
        &req.end_time,
        &state.limits,
        chrono::Utc::now(),
    ) {
        Ok(window) => window,
        Err(e) => {
            debug!("rejected schedule request for '{}': {e}", req.event_id);
            return errors(StatusCode::BAD_REQUEST, e.reasons);
        }
    };

    match state
        .scheduler
        .schedule_job(&window.event_id, window.start, window.end)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "eventId": window.event_id, "accepted": true })),
        )
            .into_response(),
        Err(e) => errors(StatusCode::INTERNAL_SERVER_ERROR, vec![e.to_string()]),
    }
}

/// `GET /jobs`
pub async fn list(State(state): State<AppState>) -> Response {
    match state.scheduler.jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors(StatusCode::SERVICE_UNAVAILABLE, vec![e.to_string()]),
    }
}

/// `DELETE /jobs/{event_id}` - run the stop action now.
pub async fn remove(State(state): State<AppState>, Path(event_id): Path<String>) -> Response {
    match state.scheduler.stop_job(&event_id).await {
        Ok(true) => Json(json!({ "eventId": event_id, "stopped": true })).into_response(),
        Ok(false) => errors(
            StatusCode::NOT_FOUND,
            vec![format!("no job scheduled for event '{event_id}'")],
        ),
        Err(e) => errors(StatusCode::SERVICE_UNAVAILABLE, vec![e.to_string()]),
    }
}
