//! Working-tree plumbing: cloning, materializing template content, committing
//! and pushing.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::azure::RepositoryRef;
use crate::error::{ProvisionError, Result};

/// Git metadata directory, never treated as content
pub const GIT_DIR: &str = ".git";

/// Branch every provisioned repository is pushed to
pub const MAIN_BRANCH: &str = "main";

/// User name sent alongside the access token
const CREDENTIAL_USERNAME: &str = "username";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Clone, stage, commit and push
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn clone_repository(&self, repository: &RepositoryRef, destination: &Path) -> Result<()>;

    async fn add_all_files(&self, working_dir: &Path) -> Result<()>;

    /// Commit the index and return the new commit id
    async fn commit(&self, working_dir: &Path, message: &str, author: &CommitAuthor)
    -> Result<String>;

    async fn push(&self, working_dir: &Path, branch: &str) -> Result<()>;
}

/// [`VersionControl`] driving the `git` executable
#[derive(Clone)]
pub struct GitCli {
    access_token: String,
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl GitCli {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", CREDENTIAL_USERNAME, self.access_token);
        format!(
            "http.extraHeader=Authorization: Basic {}",
            STANDARD.encode(credentials)
        )
    }

    /// Run `git <args>` and return trimmed stdout. `config` is passed as
    /// `-c` options and is kept out of the logs.
    async fn run(&self, cwd: Option<&Path>, config: &[String], args: &[&str]) -> Result<String> {
        let command_line = format!("git {}", args.join(" "));
        match cwd {
            Some(dir) => info!("Running (cwd = '{}'): {}", dir.display(), command_line),
            None => info!("Running: {}", command_line),
        }

        let mut command = Command::new("git");
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        for option in config {
            command.arg("-c").arg(option);
        }
        command.args(args).env("GIT_TERMINAL_PROMPT", "0");

        let output = command.output().await.map_err(|e| {
            error!("{} failed to start: {}", command_line, e);
            ProvisionError::GitOperationFailed {
                operation: command_line.clone(),
                message: e.to_string(),
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("{} failed: {}", command_line, stderr);
            return Err(ProvisionError::GitOperationFailed {
                operation: command_line,
                message: stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("{} output:\n{}", command_line, stdout);
        Ok(stdout)
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repository(&self, repository: &RepositoryRef, destination: &Path) -> Result<()> {
        info!("Cloning repository '{}'", repository.name);
        let destination = destination.to_string_lossy();
        self.run(
            None,
            &[self.auth_header()],
            &["clone", "--quiet", &repository.remote_url, &destination],
        )
        .await?;
        info!("Cloned repository '{}'", repository.name);
        Ok(())
    }

    async fn add_all_files(&self, working_dir: &Path) -> Result<()> {
        self.run(Some(working_dir), &[], &["add", "--all"]).await?;
        Ok(())
    }

    async fn commit(
        &self,
        working_dir: &Path,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<String> {
        let identity = [
            format!("user.name={}", author.name),
            format!("user.email={}", author.email),
        ];
        self.run(Some(working_dir), &identity, &["commit", "--quiet", "-m", message])
            .await?;
        self.run(Some(working_dir), &[], &["rev-parse", "HEAD"]).await
    }

    async fn push(&self, working_dir: &Path, branch: &str) -> Result<()> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.run(
            Some(working_dir),
            &[self.auth_header()],
            &["push", "--quiet", "origin", &refspec],
        )
        .await?;
        info!("Pushed to origin/{}", branch);
        Ok(())
    }
}

/// Move the template's content into the new repository's working tree.
///
/// Everything except `.git` is moved; entries of the same name already in the
/// target are replaced. Returns the number of top-level entries moved.
pub fn materialize_template(template_dir: &Path, target_dir: &Path) -> Result<usize> {
    info!(
        "Copying template content from {:?} to {:?}",
        template_dir, target_dir
    );
    fs::create_dir_all(target_dir)?;

    let mut moved = 0;
    for entry in fs::read_dir(template_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == GIT_DIR {
            continue;
        }

        let destination = target_dir.join(&name);
        if let Ok(existing) = destination.symlink_metadata() {
            debug!("Replacing existing {:?}", destination);
            if existing.is_dir() {
                fs::remove_dir_all(&destination)?;
            } else {
                fs::remove_file(&destination)?;
            }
        }

        fs::rename(entry.path(), &destination)?;
        moved += 1;
    }

    info!("Copied {} template entries", moved);
    Ok(moved)
}

/// Log every file and directory below `root`, skipping `.git`
pub fn log_tree(root: &Path) -> Result<()> {
    log_tree_inner(root, root)
}

fn log_tree_inner(root: &Path, dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        if entry.file_type()?.is_dir() {
            if entry.file_name() == GIT_DIR {
                continue;
            }
            info!("[dir]  {}", relative);
            log_tree_inner(root, &path)?;
        } else {
            info!("[file] {}", relative);
        }
    }
    Ok(())
}
