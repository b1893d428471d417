use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Container {container} not found")]
    ContainerNotFound { container: String },

    #[error("Container {container} already exists")]
    ContainerAlreadyExists { container: String },

    #[error("Blob {container}/{blob} not found")]
    BlobNotFound { container: String, blob: String },

    #[error("Snapshot {snapshot} of {container}/{blob} not found")]
    SnapshotNotFound {
        container: String,
        blob: String,
        snapshot: String,
    },

    #[error("Blob {container}/{blob} has {count} snapshot(s) and cannot be deleted without them")]
    SnapshotsExist {
        container: String,
        blob: String,
        count: usize,
    },

    #[error("Blob {blob} is a {actual} blob, operation requires a {expected} blob")]
    InvalidBlobType {
        blob: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("Block list for {blob} references unknown block {block_id}")]
    InvalidBlockList { blob: String, block_id: String },

    #[error("Copy into {blob} is still pending, content is not readable yet")]
    CopyPending { blob: String },

    #[error("No pending copy on {blob}")]
    NoPendingCopy { blob: String },

    #[error("Copy id {given} does not match the pending copy on {blob}")]
    CopyIdMismatch { blob: String, given: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Azure storage error: {0}")]
    AzureStorageError(String),

    #[error("Azure SDK error: {0}")]
    AzureError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// True for the "does not exist" family, used by teardown to treat an
    /// already-removed resource as released.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::ContainerNotFound { .. }
                | GatewayError::BlobNotFound { .. }
                | GatewayError::SnapshotNotFound { .. }
        )
    }
}

/// A failure that aborts a single scenario. Only raised for gateway errors
/// the scenario cannot work around; failed checks are recorded in the
/// scenario report instead.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{step} failed: {source}")]
    Gateway {
        step: String,
        #[source]
        source: GatewayError,
    },
}

/// Attaches the name of the scenario step to a gateway failure.
pub trait StepExt<T> {
    fn step(self, step: &str) -> std::result::Result<T, ScenarioError>;
}

impl<T> StepExt<T> for Result<T> {
    fn step(self, step: &str) -> std::result::Result<T, ScenarioError> {
        self.map_err(|source| ScenarioError::Gateway {
            step: step.to_string(),
            source,
        })
    }
}

#[cfg(feature = "azure")]
impl From<azure_core::Error> for GatewayError {
    fn from(err: azure_core::Error) -> Self {
        use azure_core::error::ErrorKind;

        match err.kind() {
            ErrorKind::Io => GatewayError::Transport(err.to_string()),
            ErrorKind::Credential => GatewayError::Transport(err.to_string()),
            ErrorKind::HttpResponse { .. } => GatewayError::AzureStorageError(err.to_string()),
            _ => GatewayError::AzureError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_family() {
        let err = GatewayError::ContainerNotFound {
            container: "c".into(),
        };
        assert!(err.is_not_found());
        assert!(!GatewayError::Transport("reset".into()).is_not_found());
    }

    #[test]
    fn test_step_attaches_context() {
        let result: Result<()> = Err(GatewayError::Transport("connection refused".into()));
        let err = result.step("create container").unwrap_err();
        assert_eq!(
            err.to_string(),
            "create container failed: Transport error: connection refused"
        );
    }
}
