//! Error types for the InfluxDB Operator

use std::fmt;

use kube::runtime::finalizer;
use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a pod copy that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPhase {
    /// Resolving the pod and its container
    Lookup,
    /// Creating parent directories inside the pod
    Mkdir,
    /// Building the tar stream from local bytes
    Encode,
    /// Running tar inside the pod
    Exec,
    /// Unpacking the tar stream to local disk
    Decode,
}

impl fmt::Display for CopyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            CopyPhase::Lookup => "lookup",
            CopyPhase::Mkdir => "mkdir",
            CopyPhase::Encode => "encode",
            CopyPhase::Exec => "exec",
            CopyPhase::Decode => "decode",
        };
        f.write_str(phase)
    }
}

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Could not open a session against the control plane
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote command stream failed or the command reported failure
    #[error("Remote execution error: {0}")]
    RemoteExecution(String),

    /// Pod is in a terminal phase and cannot be exec'd into
    #[error("cannot exec into a container in a completed pod {pod}; current phase is {phase}")]
    PodNotRunning { pod: String, phase: String },

    /// Malformed `[[namespace/]pod:]path` reference
    #[error("File spec error: {0}")]
    FileSpec(String),

    /// Tar encoding failed
    #[error("Tar encoding error: {0}")]
    Encoding(String),

    /// Tar decoding failed
    #[error("Tar decoding error: {0}")]
    Decoding(String),

    /// Archive contained no entries
    #[error("{0}: no such file or directory")]
    NoSuchEntry(String),

    /// A pod copy failed in one of its phases
    #[error("Pod copy failed during {phase}: {source}")]
    Copy {
        phase: CopyPhase,
        #[source]
        source: Box<Error>,
    },

    /// Secret lookup or decoding failed
    #[error("Credential resolution error: {0}")]
    CredentialResolution(String),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote operation exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a remote execution error
    pub fn remote(msg: impl Into<String>) -> Self {
        Error::RemoteExecution(msg.into())
    }

    /// Create a credential resolution error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Error::CredentialResolution(msg.into())
    }

    /// Tag an error with the pod copy phase it happened in
    pub fn in_phase(self, phase: CopyPhase) -> Self {
        match self {
            already @ Error::Copy { .. } => already,
            other => Error::Copy {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, looking through copy phase tags and failures of
    /// the reconcile wrapped by a finalizer
    pub fn root(&self) -> &Error {
        match self {
            Error::Copy { source, .. } => source.root(),
            Error::Finalizer(inner) => match inner.as_ref() {
                finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => e.root(),
                _ => self,
            },
            other => other,
        }
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
