//! Service hook payload and the provisioning request derived from it

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{ProvisionError, Result};

/// The only event type that can trigger provisioning
pub const PUSH_EVENT_TYPE: &str = "git.push";

/// Old object id of a ref that did not exist before the push
pub const ZERO_OBJECT_ID: &str = "0000000000000000000000000000000000000000";

/// Subset of the Azure DevOps `git.push` service hook body.
///
/// Every field is optional so a sparse or foreign payload still deserializes;
/// missing values are reported by [`ProvisioningRequest::from_payload`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHookPayload {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub resource: Option<PushResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResource {
    #[serde(default)]
    pub ref_updates: Option<Vec<RefUpdate>>,
    #[serde(default)]
    pub repository: Option<RepositoryInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    #[serde(default)]
    pub old_object_id: Option<String>,
    #[serde(default)]
    pub new_object_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryInfo {
    /// Kept as text; only a new-repository push needs it to be a UUID
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ServiceHookPayload {
    /// Parse a raw request body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| ProvisionError::InvalidPayload(e.to_string()))
    }

    /// Name of the pushed repository, when the payload carries one
    pub fn repository_name(&self) -> Option<&str> {
        self.repository().and_then(|r| r.name.as_deref())
    }

    fn first_ref_update(&self) -> Option<&RefUpdate> {
        self.resource
            .as_ref()
            .and_then(|r| r.ref_updates.as_deref())
            .and_then(<[RefUpdate]>::first)
    }

    fn repository(&self) -> Option<&RepositoryInfo> {
        self.resource.as_ref().and_then(|r| r.repository.as_ref())
    }
}

/// The three segments of a `<Project>.<Type>.<Component>` repository name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName {
    pub project_name: String,
    pub repository_type: String,
    pub component_name: String,
}

impl RepositoryName {
    /// Name of the repository whose content seeds repositories of this type
    pub fn template_repository_name(&self) -> String {
        format!("{}.Templates.{}", self.project_name, self.repository_type)
    }
}

/// Split a dotted repository name into project, type and component.
pub fn parse_repository_name(name: &str) -> Result<RepositoryName> {
    match name.split('.').collect::<Vec<_>>().as_slice() {
        [project, repository_type, component] => Ok(RepositoryName {
            project_name: project.to_string(),
            repository_type: repository_type.to_string(),
            component_name: component.to_string(),
        }),
        _ => Err(ProvisionError::InvalidRepositoryName(name.to_string())),
    }
}

/// A validated request to provision a freshly created repository.
///
/// Only obtainable through [`ProvisioningRequest::from_payload`], so the
/// parsed name is always present.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub event_type: String,
    pub old_commit_id: String,
    pub new_commit_id: String,
    pub repository_name: String,
    pub team_project_name: String,
    pub team_project_id: String,
    pub repository_id: Uuid,
    pub parsed_name: RepositoryName,
}

impl ProvisioningRequest {
    /// Validate the event and build the request.
    ///
    /// Non-push events fail with `UnsupportedEvent`; pushes to a ref that
    /// already existed fail with `AlreadyProvisioned`. Both are no-ops.
    pub fn from_payload(payload: &ServiceHookPayload) -> Result<Self> {
        let event_type = payload.event_type.clone().unwrap_or_default();
        if event_type != PUSH_EVENT_TYPE {
            return Err(ProvisionError::UnsupportedEvent(event_type));
        }

        let ref_update = payload.first_ref_update();
        let old_commit_id = ref_update
            .and_then(|u| u.old_object_id.clone())
            .unwrap_or_default();
        let new_commit_id = ref_update
            .and_then(|u| u.new_object_id.clone())
            .unwrap_or_default();

        let repository = payload.repository();
        if old_commit_id != ZERO_OBJECT_ID {
            let repository_name = repository
                .and_then(|r| r.name.clone())
                .unwrap_or_default();
            info!(
                "Push to existing repository '{}' (commit {}), nothing to provision",
                repository_name, new_commit_id
            );
            return Err(ProvisionError::AlreadyProvisioned {
                repository: repository_name,
                commit: new_commit_id,
            });
        }

        let repository_name = repository
            .and_then(|r| r.name.clone())
            .ok_or_else(|| missing("resource.repository.name"))?;
        let project = repository.and_then(|r| r.project.as_ref());
        let team_project_name = project
            .and_then(|p| p.name.clone())
            .ok_or_else(|| missing("resource.repository.project.name"))?;
        let team_project_id = project
            .and_then(|p| p.id.clone())
            .ok_or_else(|| missing("resource.repository.project.id"))?;
        let repository_id = repository
            .and_then(|r| r.id.as_deref())
            .ok_or_else(|| missing("resource.repository.id"))?;
        let repository_id = Uuid::parse_str(repository_id).map_err(|e| {
            ProvisionError::InvalidPayload(format!(
                "resource.repository.id '{}' is not a UUID: {}",
                repository_id, e
            ))
        })?;

        info!("New repository '{}' found", repository_name);
        let parsed_name = parse_repository_name(&repository_name)?;

        Ok(Self {
            event_type,
            old_commit_id,
            new_commit_id,
            repository_name,
            team_project_name,
            team_project_id,
            repository_id,
            parsed_name,
        })
    }

    pub fn component_name(&self) -> &str {
        &self.parsed_name.component_name
    }
}

fn missing(field: &str) -> ProvisionError {
    ProvisionError::InvalidPayload(format!("missing field '{}'", field))
}
