//! API handlers for the configuration endpoints.

use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::http::auth::SessionToken;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::SessionError;
use crate::transaction::CommitError;

#[derive(Debug, Deserialize, Default)]
pub struct UpdateParams {
    /// Override reference-integrity rejection of removals.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct SchemaParams {
    pub path: String,
}

pub async fn create_session(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let response = match state.sessions.create() {
        Ok(token) => (StatusCode::CREATED, Json(json!({ "token": token }))).into_response(),
        Err(error @ SessionError::Conflict) => {
            (StatusCode::CONFLICT, Json(json!({ "error": error.to_string() }))).into_response()
        }
        Err(error) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": error.to_string() }))).into_response()
        }
    };
    metrics::record_request("session_create", response.status().as_u16(), start);
    response
}

pub async fn end_session(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Response {
    let start = Instant::now();
    let response = match state.sessions.end(&token) {
        Ok(()) => Json(json!({ "status": "session ended" })).into_response(),
        Err(error) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": error.to_string() }))).into_response()
        }
    };
    metrics::record_request("session_end", response.status().as_u16(), start);
    response
}

pub async fn get_running(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let response = Json(state.manager.dump_running_config()).into_response();
    metrics::record_request("running_get", response.status().as_u16(), start);
    response
}

pub async fn update_running(
    State(state): State<AppState>,
    Query(params): Query<UpdateParams>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    let start = Instant::now();
    let result = state.manager.make_candidate_config(&patch, params.force);
    metrics::record_transaction("make", result.is_ok());
    let response = match result {
        Ok(()) => Json(json!({ "status": "candidate opened" })).into_response(),
        Err(error) => commit_error_response(error),
    };
    metrics::record_request("running_update", response.status().as_u16(), start);
    response
}

pub async fn diff_running(
    State(state): State<AppState>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    let start = Instant::now();
    let response = match state.manager.get_config_diff(&patch) {
        Ok(diff) => Json(diff).into_response(),
        Err(error) => commit_error_response(error),
    };
    metrics::record_request("running_diff", response.status().as_u16(), start);
    response
}

pub async fn get_candidate(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let response = match state.manager.dump_candidate_config() {
        Some(candidate) => Json(candidate).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no candidate configuration is open" })),
        )
            .into_response(),
    };
    metrics::record_request("candidate_get", response.status().as_u16(), start);
    response
}

pub async fn apply_candidate(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let result = state.manager.apply_candidate_config();
    metrics::record_transaction("apply", result.is_ok());
    let response = match result {
        Ok(order) => Json(json!({ "status": "applied", "order": order })).into_response(),
        Err(error) => commit_error_response(error),
    };
    metrics::record_request("candidate_apply", response.status().as_u16(), start);
    response
}

pub async fn cancel_candidate(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let result = state.manager.cancel_candidate_config();
    metrics::record_transaction("cancel", result.is_ok());
    let response = match result {
        Ok(()) => Json(json!({ "status": "cancelled" })).into_response(),
        Err(error) => commit_error_response(error),
    };
    metrics::record_request("candidate_cancel", response.status().as_u16(), start);
    response
}

pub async fn get_schema(
    State(state): State<AppState>,
    Query(params): Query<SchemaParams>,
) -> Response {
    let start = Instant::now();
    let response = match state.manager.get_schema_by_xpath(&params.path) {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no schema node at `{}`", params.path) })),
        )
            .into_response(),
    };
    metrics::record_request("schema_get", response.status().as_u16(), start);
    response
}

/// Map a transaction failure onto the API surface: a missing candidate
/// is a conflict, everything else a rejected (unprocessable) edit.
fn commit_error_response(error: CommitError) -> Response {
    let status = match &error {
        CommitError::NoCandidate => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    metrics::record_validation_failure(match &error {
        CommitError::NoCandidate => "no_candidate",
        CommitError::Schema(_) => "schema",
        CommitError::Constraint { .. } => "constraint",
        CommitError::Cycle(_) => "cycle",
        CommitError::ReferenceHeld { .. } => "reference",
        CommitError::Tree(_) => "tree",
    });
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
