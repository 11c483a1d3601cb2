//! Liveness and status endpoints

use axum::{
    Json,
    extract::{Query, State as AxumState},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::SharedState;
use crate::run::RunOutcome;

const DEFAULT_RECENT_RUNS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Number of recent runs to include (default: 10)
    pub limit: Option<usize>,
}

pub async fn root() -> &'static str {
    "Repository provisioner is running"
}

/// GET /status - server info, run counts and the most recent runs
pub async fn status(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<StatusQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_RUNS);
    let store = state.run_store.lock().await;
    let recent = store.get_recent_runs(limit);

    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "runs": {
            "total": store.len(),
            "in_progress": store.count_by_outcome(RunOutcome::InProgress),
            "provisioned": store.count_by_outcome(RunOutcome::Provisioned),
            "skipped": store.count_by_outcome(RunOutcome::Skipped),
            "failed": store.count_by_outcome(RunOutcome::Failed),
            "recent": recent,
        },
    }))
}
