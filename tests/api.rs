use async_trait::async_trait;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use repo_provisioner::azure::{PipelineClient, RepositoryCatalog, RepositoryRef};
use repo_provisioner::error::Result;
use repo_provisioner::git::{CommitAuthor, VersionControl};
use repo_provisioner::pipeline::{BuildDefinitionRequest, PipelineSettings};
use repo_provisioner::provision::{ProvisionSettings, Provisioner};
use repo_provisioner::webhook::ZERO_OBJECT_ID;
use repo_provisioner::{AppState, build_router};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

struct StaticCatalog(Vec<RepositoryRef>);

#[async_trait]
impl RepositoryCatalog for StaticCatalog {
    async fn list_repositories(&self, _project_id: &str) -> Result<Vec<RepositoryRef>> {
        Ok(self.0.clone())
    }
}

/// Holds the lookup until released, so a run can be observed mid-flight
struct GatedCatalog {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl RepositoryCatalog for GatedCatalog {
    async fn list_repositories(&self, _project_id: &str) -> Result<Vec<RepositoryRef>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

/// Seeds template clones with a small tree; new repository clones only get `.git`
struct SeedingVcs;

#[async_trait]
impl VersionControl for SeedingVcs {
    async fn clone_repository(&self, repository: &RepositoryRef, destination: &Path) -> Result<()> {
        std::fs::create_dir_all(destination.join(".git"))?;
        if repository.name.contains(".Templates.") {
            std::fs::write(destination.join("README.md"), "# [[COMPONENTNAME]]")?;
            std::fs::write(destination.join("pipeline.yml"), "trigger: main")?;
        }
        Ok(())
    }

    async fn add_all_files(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }

    async fn commit(&self, working_dir: &Path, _message: &str, _author: &CommitAuthor) -> Result<String> {
        assert_eq!(
            std::fs::read_to_string(working_dir.join("README.md"))?,
            "# Invoice"
        );
        Ok("c0ffee".to_string())
    }

    async fn push(&self, _working_dir: &Path, _branch: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPipelines(Mutex<Vec<String>>);

#[async_trait]
impl PipelineClient for RecordingPipelines {
    async fn create_pipeline(&self, _project: &str, definition: &BuildDefinitionRequest) -> Result<()> {
        self.0.lock().unwrap().push(definition.name.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn repository(name: &str) -> RepositoryRef {
    RepositoryRef {
        id: format!("id-{}", name),
        name: name.to_string(),
        remote_url: format!("https://dev.azure.com/contoso/Shop/_git/{}", name),
    }
}

fn app(pipelines: Arc<RecordingPipelines>) -> axum::Router {
    let catalog = Arc::new(StaticCatalog(vec![
        repository("Shop.Templates.Api"),
        repository("Shop.Api.Invoice"),
        repository("Shop.Web.Portal"),
    ]));
    app_with_catalog(catalog, pipelines)
}

fn app_with_catalog(
    catalog: Arc<dyn RepositoryCatalog>,
    pipelines: Arc<RecordingPipelines>,
) -> axum::Router {
    let provisioner = Provisioner::new(
        catalog,
        Arc::new(SeedingVcs),
        pipelines,
        ProvisionSettings {
            author: CommitAuthor {
                name: "Provisioner".into(),
                email: "provisioner@example.com".into(),
            },
            pipelines: PipelineSettings {
                definition_file: "pipeline.yml".into(),
                queue_name: "Azure Pipelines".into(),
                root_name_postfix: Some("Orchestrator".into()),
            },
            work_directory: None,
        },
    );
    build_router(Arc::new(AppState::new(provisioner, 10)))
}

fn push_event(repository_name: &str, old_object_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "eventType": "git.push",
        "resource": {
            "refUpdates": [{ "oldObjectId": old_object_id, "newObjectId": "5d1b6e2e8c4a3f0a9b7c6d5e4f3a2b1c0d9e8f7a" }],
            "repository": {
                "id": "278d5cd2-584d-4b63-824a-2ba458937249",
                "name": repository_name,
                "project": { "id": "6ce954b1-ce1f-45d1-b94d-e6bf2464ba2c", "name": "Shop" }
            }
        }
    }))
    .unwrap()
}

/// POST a raw body to /webhook and return (status, body text).
async fn post_webhook(app: axum::Router, body: Vec<u8>) -> (StatusCode, String) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_repository_is_provisioned_with_empty_response() {
    let pipelines = Arc::new(RecordingPipelines::default());
    let app = app(pipelines.clone());

    let (status, body) = post_webhook(app.clone(), push_event("Shop.Api.Invoice", ZERO_OBJECT_ID)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");
    assert_eq!(
        *pipelines.0.lock().unwrap(),
        vec!["Shop.Api.Invoice.Orchestrator".to_string()]
    );

    let (_, status_json) = get(app, "/status").await;
    assert_eq!(status_json["runs"]["provisioned"], 1);
    let run = &status_json["runs"]["recent"][0];
    assert_eq!(run["outcome"], "provisioned");
    assert_eq!(run["stage"], "done");
    assert_eq!(run["commit_id"], "c0ffee");
    assert_eq!(run["template_repository"], "Shop.Templates.Api");
}

#[tokio::test]
async fn push_to_existing_repository_is_a_silent_no_op() {
    let pipelines = Arc::new(RecordingPipelines::default());
    let app = app(pipelines.clone());

    let (status, body) = post_webhook(
        app.clone(),
        push_event("Shop.Api.Invoice", "8f9e0d1c2b3a4f5e6d7c8b9a0f1e2d3c4b5a6f7e"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");
    assert!(pipelines.0.lock().unwrap().is_empty());

    let (_, status_json) = get(app, "/status").await;
    assert_eq!(status_json["runs"]["skipped"], 1);
}

#[tokio::test]
async fn repository_type_without_template_is_a_silent_no_op() {
    let app = app(Arc::new(RecordingPipelines::default()));

    let (status, body) = post_webhook(app, push_event("Shop.Web.Portal", ZERO_OBJECT_ID)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let app = app(Arc::new(RecordingPipelines::default()));
    let body = serde_json::to_vec(&json!({ "eventType": "build.complete" })).unwrap();

    let (status, body) = post_webhook(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");
}

#[tokio::test]
async fn failures_answer_200_with_the_error_message() {
    let app = app(Arc::new(RecordingPipelines::default()));

    let (status, body) = post_webhook(app.clone(), push_event("Invoice", ZERO_OBJECT_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Invalid repository name 'Invoice'"), "{body}");

    let (status, body) = post_webhook(app.clone(), b"not json".to_vec()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Invalid webhook payload"), "{body}");

    let (_, status_json) = get(app, "/status").await;
    assert_eq!(status_json["runs"]["failed"], 2);
    assert_eq!(status_json["runs"]["recent"][1]["repository_name"], "Invoice");
}

// ---------------------------------------------------------------------------
// Status and runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn root_answers() {
    let app = app(Arc::new(RecordingPipelines::default()));
    let req = axum::http::Request::builder()
        .uri("/")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reports_server_and_limits_recent_runs() {
    let app = app(Arc::new(RecordingPipelines::default()));
    for _ in 0..3 {
        post_webhook(app.clone(), push_event("Shop.Web.Portal", ZERO_OBJECT_ID)).await;
    }

    let (status, json) = get(app, "/status?limit=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["server"]["name"], "repo_provisioner");
    assert_eq!(json["runs"]["total"], 3);
    assert_eq!(json["runs"]["recent"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn runs_can_be_fetched_by_id() {
    let app = app(Arc::new(RecordingPipelines::default()));
    post_webhook(app.clone(), push_event("Shop.Api.Invoice", ZERO_OBJECT_ID)).await;
    let (_, status_json) = get(app.clone(), "/status").await;
    let id = status_json["runs"]["recent"][0]["id"].as_str().unwrap().to_string();

    let (status, run) = get(app.clone(), &format!("/runs/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["id"], id);
    assert_eq!(run["pipelines"][0], "Shop.Api.Invoice.Orchestrator");

    let (status, json) = get(app, "/runs/0199e7a4-0000-7000-8000-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Run not found");
}

#[tokio::test]
async fn status_shows_runs_still_in_progress() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let catalog = Arc::new(GatedCatalog {
        entered: entered.clone(),
        release: release.clone(),
    });
    let app = app_with_catalog(catalog, Arc::new(RecordingPipelines::default()));

    let pending = tokio::spawn(post_webhook(
        app.clone(),
        push_event("Shop.Api.Invoice", ZERO_OBJECT_ID),
    ));
    entered.notified().await;

    let (_, json) = get(app.clone(), "/status").await;
    assert_eq!(json["runs"]["total"], 1);
    assert_eq!(json["runs"]["in_progress"], 1);
    assert_eq!(json["runs"]["recent"][0]["outcome"], "in_progress");

    release.notify_one();
    let (status, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "");

    let (_, json) = get(app, "/status").await;
    assert_eq!(json["runs"]["total"], 1);
    assert_eq!(json["runs"]["in_progress"], 0);
    assert_eq!(json["runs"]["skipped"], 1);
}
