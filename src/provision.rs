//! Sequences one provisioning run from webhook body to registered pipelines

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{error, info};

use crate::azure::{PipelineClient, RepositoryCatalog, RepositoryRef};
use crate::error::{ProvisionError, Result};
use crate::git::{self, CommitAuthor, MAIN_BRANCH, VersionControl};
use crate::password::{PasswordGenerator, RandomPasswordGenerator};
use crate::pipeline::{self, PipelineSettings};
use crate::placeholder::{EnglishInflector, Inflector, PlaceholderResolver};
use crate::run::{ProvisioningRun, RunStage};
use crate::templating::TemplateEngine;
use crate::webhook::{ProvisioningRequest, ServiceHookPayload};

const TEMP_DIR_PREFIX: &str = "provision-";

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub author: CommitAuthor,
    pub pipelines: PipelineSettings,
    /// Parent of the temporary clones; the system temp dir when unset
    pub work_directory: Option<PathBuf>,
}

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Provisioned {
        commit_id: String,
        pipelines: Vec<String>,
    },
    Skipped {
        reason: String,
    },
}

/// Runs the provisioning pipeline against its collaborators
pub struct Provisioner {
    catalog: Arc<dyn RepositoryCatalog>,
    vcs: Arc<dyn VersionControl>,
    pipelines: Arc<dyn PipelineClient>,
    passwords: Arc<dyn PasswordGenerator>,
    inflector: Arc<dyn Inflector>,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        catalog: Arc<dyn RepositoryCatalog>,
        vcs: Arc<dyn VersionControl>,
        pipelines: Arc<dyn PipelineClient>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            catalog,
            vcs,
            pipelines,
            passwords: Arc::new(RandomPasswordGenerator),
            inflector: Arc::new(EnglishInflector),
            settings,
        }
    }

    pub fn with_password_generator(mut self, passwords: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_inflector(mut self, inflector: Arc<dyn Inflector>) -> Self {
        self.inflector = inflector;
        self
    }

    /// Handle one webhook body and record its progress in `run`.
    ///
    /// No-op conditions end as [`ProvisionOutcome::Skipped`]; everything else
    /// that goes wrong is returned as an error.
    pub async fn handle(&self, body: &[u8], run: &mut ProvisioningRun) -> Result<ProvisionOutcome> {
        match self.provision(body, run).await {
            Ok((commit_id, pipelines)) => {
                info!(
                    "Run {} provisioned '{}' with {} pipeline(s)",
                    run.id,
                    run.repository_name.as_deref().unwrap_or_default(),
                    pipelines.len()
                );
                run.commit_id = Some(commit_id.clone());
                run.pipelines = pipelines.clone();
                run.mark_done();
                Ok(ProvisionOutcome::Provisioned {
                    commit_id,
                    pipelines,
                })
            }
            Err(e) if e.is_noop() => {
                info!("Run {} skipped: {}", run.id, e);
                run.mark_skipped(e.to_string());
                Ok(ProvisionOutcome::Skipped {
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                error!("Run {} failed at stage {:?}: {}", run.id, run.stage, e);
                run.mark_failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        body: &[u8],
        run: &mut ProvisioningRun,
    ) -> Result<(String, Vec<String>)> {
        let payload = ServiceHookPayload::from_slice(body)?;
        run.repository_name = payload.repository_name().map(String::from);

        let request = ProvisioningRequest::from_payload(&payload)?;
        run.advance(RunStage::Validated);

        let (template, target) = self.resolve_repositories(&request).await?;
        run.template_repository = Some(template.name.clone());
        run.advance(RunStage::Resolved);

        // both directories are removed when dropped, whatever the exit path
        let template_dir = self.temp_dir()?;
        let target_dir = self.temp_dir()?;
        self.vcs.clone_repository(&template, template_dir.path()).await?;
        self.vcs.clone_repository(&target, target_dir.path()).await?;
        run.advance(RunStage::Cloned);

        let (source, destination) = (template_dir.path().to_path_buf(), target_dir.path().to_path_buf());
        blocking(move || git::materialize_template(&source, &destination)).await?;
        run.advance(RunStage::Materialized);

        let resolver = PlaceholderResolver::new(
            request.component_name(),
            Arc::clone(&self.passwords),
            Arc::clone(&self.inflector),
        );
        let working_dir = target_dir.path().to_path_buf();
        blocking(move || {
            TemplateEngine::new(resolver).render_tree(&working_dir)?;
            git::log_tree(&working_dir)
        })
        .await?;
        run.advance(RunStage::Templated);

        let message = format!("Initial filling from {}", template.name);
        self.vcs.add_all_files(target_dir.path()).await?;
        let commit_id = self
            .vcs
            .commit(target_dir.path(), &message, &self.settings.author)
            .await?;
        self.vcs.push(target_dir.path(), MAIN_BRANCH).await?;
        info!("Committed {} to '{}' and pushed", commit_id, target.name);
        run.commit_id = Some(commit_id.clone());
        run.advance(RunStage::Committed);

        let pipelines = pipeline::register_pipelines(
            self.pipelines.as_ref(),
            &self.settings.pipelines,
            &request,
            &target,
            target_dir.path(),
        )
        .await?;
        run.advance(RunStage::PipelinesRegistered);

        Ok((commit_id, pipelines))
    }

    /// Find the template (`<project>.Templates.<type>`) and the new repository
    async fn resolve_repositories(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<(RepositoryRef, RepositoryRef)> {
        let repositories = self.catalog.list_repositories(&request.team_project_id).await?;
        let template_name = request.parsed_name.template_repository_name();

        let template = repositories
            .iter()
            .find(|r| r.name == template_name)
            .cloned()
            .ok_or_else(|| ProvisionError::TemplateNotFound(template_name.clone()))?;
        info!(
            "Found template repository '{}' at {}",
            template.name, template.remote_url
        );

        let target = repositories
            .iter()
            .find(|r| r.name == request.repository_name)
            .cloned()
            .ok_or_else(|| ProvisionError::NewRepositoryNotFound(request.repository_name.clone()))?;
        info!("Found new repository '{}' at {}", target.name, target.remote_url);

        Ok((template, target))
    }

    fn temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_DIR_PREFIX);
        let dir = match &self.settings.work_directory {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// Run file-system work off the async executor
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProvisionError::TaskFailed(e.to_string()))?
}
