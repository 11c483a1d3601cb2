use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::SharedState;

/// GET /runs/{id} - one run record
pub async fn get_run(
    AxumState(state): AxumState<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.run_store.lock().await;
    match store.get_run(&id) {
        Some(run) => Json(run.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Run not found"})),
        )
            .into_response(),
    }
}
