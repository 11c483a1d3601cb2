//! Webhook handler for Azure DevOps `git.push` service hooks

use axum::{body::Bytes, extract::State as AxumState, http::StatusCode};
use tracing::{debug, info};

use crate::SharedState;
use crate::run::ProvisioningRun;

/// Handles the service hook POST request.
///
/// Always answers 200: the hook is disabled upstream after repeated non-2xx
/// deliveries. A failed run puts its error message in the body, anything
/// else leaves the body empty.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    body: Bytes,
) -> (StatusCode, String) {
    let mut run = ProvisioningRun::new();
    info!("Received webhook ({} bytes), run {}", body.len(), run.id);
    debug!("Payload: {}", String::from_utf8_lossy(&body));
    state.run_store.lock().await.add_run(run.clone());

    let response = match state.provisioner.handle(&body, &mut run).await {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    };

    state.run_store.lock().await.update_run(run);
    (StatusCode::OK, response)
}
