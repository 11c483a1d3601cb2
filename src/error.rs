use std::io;

/// Custom error type for repo_provisioner operations
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Invalid repository name '{0}': expected <ProjectName>.<RepositoryType>.<ComponentName>")]
    InvalidRepositoryName(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(String),

    #[error("Repository '{repository}' already provisioned (commit {commit})")]
    AlreadyProvisioned { repository: String, commit: String },

    #[error("No template repository '{0}' found")]
    TemplateNotFound(String),

    #[error("Newly created repository '{0}' could not be found")]
    NewRepositoryNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Git operation failed: {operation}\n{message}")]
    GitOperationFailed { operation: String, message: String },

    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    #[error("Pipeline registration failed for '{name}' (status {status}): {body}")]
    PipelineRegistrationFailed {
        name: String,
        status: u16,
        body: String,
    },

    #[error("Cannot rename '{from}' to '{to}': target already exists")]
    RenameCollision { from: String, to: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ProvisionError {
    /// Returns true for the expected outcomes that end a run without doing
    /// anything. These are reported to the caller exactly like a success.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            ProvisionError::UnsupportedEvent(_)
                | ProvisionError::AlreadyProvisioned { .. }
                | ProvisionError::TemplateNotFound(_)
        )
    }
}

/// Helper type for Results that use ProvisionError
pub type Result<T> = std::result::Result<T, ProvisionError>;
