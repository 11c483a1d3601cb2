//! Pipeline definition discovery and registration

use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::azure::{PipelineClient, RepositoryRef};
use crate::error::Result;
use crate::git::GIT_DIR;
use crate::webhook::ProvisioningRequest;

const DEFAULT_BRANCH: &str = "main";
const REPOSITORY_TYPE: &str = "TfsGit";
const CONTINUOUS_INTEGRATION: &str = "continuousIntegration";
// "use the YAML file for trigger settings"
const SETTINGS_SOURCE_PROCESS: u8 = 2;
const YAML_PROCESS: u8 = 2;

/// A pipeline definition file found in the working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinitionFile {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    /// Name of the directory holding the file, empty at the root
    pub parent_directory: String,
}

/// Locate pipeline definitions below `root`.
///
/// A `filename` with a path separator is an explicit location and is
/// returned as-is without touching the file system.
pub fn find_pipeline_definitions(root: &Path, filename: &str) -> Result<Vec<PipelineDefinitionFile>> {
    if filename.contains(['/', '\\']) {
        return Ok(vec![PipelineDefinitionFile {
            path: filename.to_string(),
            parent_directory: String::new(),
        }]);
    }

    let mut found = Vec::new();
    collect_definitions(root, &[], filename, &mut found)?;
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn collect_definitions(
    dir: &Path,
    relative: &[String],
    filename: &str,
    found: &mut Vec<PipelineDefinitionFile>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            if name == GIT_DIR {
                continue;
            }
            let mut nested = relative.to_vec();
            nested.push(name);
            collect_definitions(&entry.path(), &nested, filename, found)?;
        } else if name == filename {
            let mut segments = relative.to_vec();
            segments.push(name);
            found.push(PipelineDefinitionFile {
                path: segments.join("/"),
                parent_directory: relative.last().cloned().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

/// `<repository>.<parent>` for nested definitions, `<repository>.<postfix>`
/// for a root definition when a postfix is configured, else `<repository>`.
pub fn pipeline_name(
    repository_name: &str,
    definition: &PipelineDefinitionFile,
    root_postfix: Option<&str>,
) -> String {
    let parent = definition.parent_directory.trim().trim_start_matches('.');
    if !parent.is_empty() {
        return format!("{}.{}", repository_name, parent);
    }
    match root_postfix
        .map(|p| p.trim().trim_start_matches('.'))
        .filter(|p| !p.is_empty())
    {
        Some(postfix) => format!("{}.{}", repository_name, postfix),
        None => repository_name.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueReference {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTrigger {
    pub settings_source_type: u8,
    pub trigger_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRepository {
    pub url: String,
    pub default_branch: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProcess {
    pub yaml_filename: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Body of `POST {project}/_apis/build/definitions`
#[derive(Debug, Clone, Serialize)]
pub struct BuildDefinitionRequest {
    pub project: String,
    pub name: String,
    pub queue: QueueReference,
    pub triggers: Vec<BuildTrigger>,
    pub repository: BuildRepository,
    pub process: BuildProcess,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl BuildDefinitionRequest {
    /// A CI-triggered YAML build on `main` in the root folder
    pub fn new(
        project: &str,
        name: &str,
        queue_name: &str,
        repository_url: &str,
        repository_id: &str,
        yaml_filename: &str,
    ) -> Self {
        Self {
            project: project.to_string(),
            name: name.to_string(),
            queue: QueueReference {
                name: queue_name.to_string(),
            },
            triggers: vec![BuildTrigger {
                settings_source_type: SETTINGS_SOURCE_PROCESS,
                trigger_type: CONTINUOUS_INTEGRATION.to_string(),
            }],
            repository: BuildRepository {
                url: repository_url.to_string(),
                default_branch: DEFAULT_BRANCH.to_string(),
                id: repository_id.to_string(),
                kind: REPOSITORY_TYPE.to_string(),
            },
            process: BuildProcess {
                yaml_filename: yaml_filename.to_string(),
                kind: YAML_PROCESS,
            },
            path: "\\".to_string(),
            kind: "build".to_string(),
        }
    }
}

/// Settings that shape every registered pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub definition_file: String,
    pub queue_name: String,
    pub root_name_postfix: Option<String>,
}

/// Discover definitions in `working_dir` and register one pipeline each.
///
/// Registrations run one after another and the first failure aborts the rest.
/// Returns the names of the registered pipelines.
pub async fn register_pipelines(
    client: &dyn PipelineClient,
    settings: &PipelineSettings,
    request: &ProvisioningRequest,
    repository: &RepositoryRef,
    working_dir: &Path,
) -> Result<Vec<String>> {
    let definitions = find_pipeline_definitions(working_dir, &settings.definition_file)?;
    info!(
        "Found {} pipeline definition(s) named '{}'",
        definitions.len(),
        settings.definition_file
    );

    let mut registered = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        let name = pipeline_name(
            &request.repository_name,
            definition,
            settings.root_name_postfix.as_deref(),
        );
        let body = BuildDefinitionRequest::new(
            &request.team_project_name,
            &name,
            &settings.queue_name,
            &repository.remote_url,
            &request.repository_id.to_string(),
            &definition.path,
        );
        client.create_pipeline(&request.team_project_name, &body).await?;
        registered.push(name);
    }

    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "trigger: none").unwrap();
    }

    fn definition(path: &str, parent: &str) -> PipelineDefinitionFile {
        PipelineDefinitionFile {
            path: path.to_string(),
            parent_directory: parent.to_string(),
        }
    }

    #[test]
    fn explicit_path_skips_the_search() {
        let missing_root = Path::new("/definitely/not/a/real/directory");
        let found = find_pipeline_definitions(missing_root, "./custom/pipeline.yml").unwrap();
        assert_eq!(found, vec![definition("./custom/pipeline.yml", "")]);

        let found = find_pipeline_definitions(missing_root, "build\\pipeline.yml").unwrap();
        assert_eq!(found, vec![definition("build\\pipeline.yml", "")]);
    }

    #[test]
    fn finds_every_matching_file_with_its_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "pipeline.yml");
        touch(root, "deploy/pipeline.yml");
        touch(root, "infra/.database/pipeline.yml");
        touch(root, "infra/other.yml");
        touch(root, ".git/pipeline.yml");

        let found = find_pipeline_definitions(root, "pipeline.yml").unwrap();

        assert_eq!(
            found,
            vec![
                definition("deploy/pipeline.yml", "deploy"),
                definition("infra/.database/pipeline.yml", ".database"),
                definition("pipeline.yml", ""),
            ]
        );
    }

    #[test]
    fn finds_nothing_in_a_tree_without_definitions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "README.md");
        assert!(find_pipeline_definitions(dir.path(), "pipeline.yml").unwrap().is_empty());
    }

    #[test]
    fn names_follow_parent_directory_or_postfix() {
        let repo = "Shop.Api.Invoice";
        assert_eq!(
            pipeline_name(repo, &definition("deploy/p.yml", "deploy"), Some("Ignored")),
            "Shop.Api.Invoice.deploy"
        );
        assert_eq!(
            pipeline_name(repo, &definition("x/.database/p.yml", ".database"), None),
            "Shop.Api.Invoice.database"
        );
        assert_eq!(
            pipeline_name(repo, &definition("p.yml", ""), Some(".Orchestrator")),
            "Shop.Api.Invoice.Orchestrator"
        );
        assert_eq!(
            pipeline_name(repo, &definition("p.yml", ""), Some("")),
            "Shop.Api.Invoice"
        );
        assert_eq!(pipeline_name(repo, &definition("p.yml", ""), None), "Shop.Api.Invoice");
    }

    #[test]
    fn dot_only_parent_or_postfix_adds_no_suffix() {
        let repo = "Shop.Api.Invoice";
        assert_eq!(
            pipeline_name(repo, &definition("../p.yml", ".."), None),
            "Shop.Api.Invoice"
        );
        assert_eq!(
            pipeline_name(repo, &definition("../p.yml", ".."), Some("Orchestrator")),
            "Shop.Api.Invoice.Orchestrator"
        );
        assert_eq!(pipeline_name(repo, &definition("p.yml", ""), Some(".")), "Shop.Api.Invoice");
    }

    #[test]
    fn build_definition_serializes_to_wire_shape() {
        let body = BuildDefinitionRequest::new("Shop", "Shop.Api.Invoice", "Default", "https://u", "id-1", "p.yml");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["queue"]["name"], "Default");
        assert_eq!(value["triggers"][0]["settingsSourceType"], 2);
        assert_eq!(value["triggers"][0]["triggerType"], "continuousIntegration");
        assert_eq!(value["repository"]["defaultBranch"], "main");
        assert_eq!(value["repository"]["type"], "TfsGit");
        assert_eq!(value["process"]["yamlFilename"], "p.yml");
        assert_eq!(value["process"]["type"], 2);
        assert_eq!(value["path"], "\\");
        assert_eq!(value["type"], "build");
    }
}
