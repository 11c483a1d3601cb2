pub mod api;
pub mod azure;
pub mod error;
pub mod git;
pub mod logging;
pub mod password;
pub mod pipeline;
pub mod placeholder;
pub mod provision;
pub mod run;
pub mod templating;
pub mod webhook;

use axum::{Router, routing};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::error::{ProvisionError, Result};
use crate::git::CommitAuthor;
use crate::pipeline::PipelineSettings;
use crate::provision::{ProvisionSettings, Provisioner};
use crate::run::RunStore;

/// Environment variable that replaces the configured access token
pub const ACCESS_TOKEN_ENV: &str = "PROVISIONER_ACCESS_TOKEN";

const AZURE_DEVOPS_HOST: &str = "https://dev.azure.com";

#[derive(Debug, Deserialize, Clone)]
pub struct ProvisionerConfig {
    pub azure_devops: AzureDevOpsConfig,
    pub repository: RepositoryConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Clone, Default)]
pub struct AzureDevOpsConfig {
    pub organization: Option<String>,
    #[serde(default)]
    pub personal_access_token: String,
    /// Overrides the URL derived from `organization`
    pub base_url: Option<String>,
}

impl std::fmt::Debug for AzureDevOpsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsConfig")
            .field("organization", &self.organization)
            .field("personal_access_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// File name searched for, or an explicit relative path
    pub pipeline_definition_file: String,
    pub author_name: String,
    pub author_email: String,
    pub work_directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub build_queue_name: String,
    /// Name postfix for a pipeline defined at the repository root
    pub default_name_postfix: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
}

impl ProvisionerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the access token when `token` is a non-empty value
    pub fn override_access_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.azure_devops.personal_access_token = token;
        }
    }

    /// Check the settings every run depends on
    pub fn validate(&self) -> Result<()> {
        let has_organization = self
            .azure_devops
            .organization
            .as_deref()
            .is_some_and(|o| !o.trim().is_empty());
        let has_base_url = self
            .azure_devops
            .base_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if !has_organization && !has_base_url {
            return Err(ProvisionError::ConfigError(
                "azure_devops.organization or azure_devops.base_url must be set".to_string(),
            ));
        }
        if self.azure_devops.personal_access_token.trim().is_empty() {
            return Err(ProvisionError::ConfigError(format!(
                "azure_devops.personal_access_token is empty and {} is not set",
                ACCESS_TOKEN_ENV
            )));
        }
        if self.repository.pipeline_definition_file.trim().is_empty() {
            return Err(ProvisionError::ConfigError(
                "repository.pipeline_definition_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Organization URL all REST calls are made against
    pub fn base_url(&self) -> String {
        match self.azure_devops.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!(
                "{}/{}",
                AZURE_DEVOPS_HOST,
                self.azure_devops.organization.as_deref().unwrap_or_default().trim()
            ),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.azure_devops.personal_access_token
    }

    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            author: CommitAuthor {
                name: self.repository.author_name.clone(),
                email: self.repository.author_email.clone(),
            },
            pipelines: PipelineSettings {
                definition_file: self.repository.pipeline_definition_file.clone(),
                queue_name: self.pipeline.build_queue_name.clone(),
                root_name_postfix: self.pipeline.default_name_postfix.clone(),
            },
            work_directory: self.repository.work_directory.clone(),
        }
    }
}

/// Load, override from the environment, and validate the configuration file
pub fn load_config(path: &str) -> Result<ProvisionerConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        ProvisionError::ConfigError(format!("Failed to read config file '{}': {}", path, e))
    })?;

    let mut config = ProvisionerConfig::from_toml_str(&content).map_err(|e| {
        ProvisionError::ConfigError(format!("Failed to parse config file '{}': {}", path, e))
    })?;
    config.override_access_token(std::env::var(ACCESS_TOKEN_ENV).ok());
    config.validate()?;

    Ok(config)
}

pub struct AppState {
    pub provisioner: Provisioner,
    pub run_store: Mutex<RunStore>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(provisioner: Provisioner, max_runs: usize) -> Self {
        Self {
            provisioner,
            run_store: Mutex::new(RunStore::new(max_runs)),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(api::root))
        .route("/webhook", routing::post(api::handle_webhook))
        .route("/status", routing::get(api::status))
        .route("/runs/{id}", routing::get(api::get_run))
        .with_state(state)
}
