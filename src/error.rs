//! Error types for target resolution and process coordination.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

/// Errors from querying the cluster control plane.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query wrote to its error stream.
    #[error("query failed: {message}")]
    Failed { message: String },

    /// kubectl could not be located.
    #[error("kubectl not found on PATH")]
    KubectlNotFound,

    #[error("query timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),
}

/// Terminal outcomes of a resolver run other than success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The picker was closed without a choice.
    #[error("resolution cancelled at the {stage} stage")]
    Cancelled { stage: Stage },

    #[error("a resolution is already in progress")]
    AlreadyRunning,
}

/// Errors from launching or cleaning up the long-running deploy task.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("task '{0}' is not defined")]
    UnknownTask(String),

    #[error("file system failure on {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch task '{name}': {source}")]
    Launch {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading or writing the persisted selection.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Outcomes that stop an attach before the debugger is launched.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("resolution cancelled")]
    ResolutionCancelled,

    #[error("a resolution is already in progress")]
    ResolverBusy,

    #[error("debugger launch failed: {0}")]
    Launch(#[source] anyhow::Error),
}

impl From<ResolveError> for AttachError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Cancelled { .. } => AttachError::ResolutionCancelled,
            ResolveError::AlreadyRunning => AttachError::ResolverBusy,
        }
    }
}
