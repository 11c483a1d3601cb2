//! Azure DevOps REST client: repository catalog and build definitions

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::pipeline::BuildDefinitionRequest;

const API_ACCEPT: &str = "application/json; api-version=5.1";

/// A remote repository as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub id: String,
    pub name: String,
    pub remote_url: String,
}

/// Lists the repositories of a team project
#[async_trait]
pub trait RepositoryCatalog: Send + Sync {
    async fn list_repositories(&self, project_id: &str) -> Result<Vec<RepositoryRef>>;
}

/// Registers build pipelines
#[async_trait]
pub trait PipelineClient: Send + Sync {
    async fn create_pipeline(&self, project: &str, definition: &BuildDefinitionRequest)
    -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct RepositoryList {
    #[serde(default)]
    value: Vec<RepositoryRef>,
}

/// HTTP client for one Azure DevOps organization
#[derive(Clone)]
pub struct AzureDevOpsClient {
    base_url: String,
    access_token: String,
    client: Client,
}

impl std::fmt::Debug for AzureDevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl AzureDevOpsClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client: Client::new(),
        }
    }

    /// `Basic` header value for a personal access token with an empty user
    fn authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!(":{}", self.access_token)))
    }
}

#[async_trait]
impl RepositoryCatalog for AzureDevOpsClient {
    async fn list_repositories(&self, project_id: &str) -> Result<Vec<RepositoryRef>> {
        let url = format!("{}/{}/_apis/git/repositories", self.base_url, project_id);
        debug!("Listing repositories: GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, API_ACCEPT)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| ProvisionError::ApiRequestFailed(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::ApiRequestFailed(format!(
                "GET {} returned {}: {}",
                url, status, body
            )));
        }

        let list: RepositoryList = response.json().await.map_err(|e| {
            ProvisionError::ApiRequestFailed(format!("Invalid repository list from {}: {}", url, e))
        })?;
        Ok(list.value)
    }
}

#[async_trait]
impl PipelineClient for AzureDevOpsClient {
    async fn create_pipeline(
        &self,
        project: &str,
        definition: &BuildDefinitionRequest,
    ) -> Result<()> {
        let url = format!("{}/{}/_apis/build/definitions", self.base_url, project);
        info!("Creating pipeline '{}': POST {}", definition.name, url);
        debug!("Build definition: {}", serde_json::to_string(definition)?);

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, API_ACCEPT)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, self.authorization())
            .json(definition)
            .send()
            .await
            .map_err(|e| ProvisionError::ApiRequestFailed(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        info!("Pipeline API answered {} for '{}'", status, definition.name);
        debug!("Pipeline API response: {}", body);

        if !status.is_success() {
            return Err(ProvisionError::PipelineRegistrationFailed {
                name: definition.name.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
