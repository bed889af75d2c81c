use std::path::PathBuf;

use thiserror::Error;

use crate::container::Role;

/// Failures the crate reports with a category attached. Everything is still
/// carried through `anyhow::Result`; callers downcast when they care which
/// category a failure belongs to.
#[derive(Debug, Error)]
pub enum JobjarError {
    // packaging
    #[error("project root {0} does not exist")]
    MissingProjectRoot(PathBuf),
    #[error("library {name} has no root directory at {path}")]
    MissingLibraryRoot { name: String, path: PathBuf },
    #[error("embedded runtime distribution not found at {0}")]
    MissingRuntime(PathBuf),
    #[error("no entry point could be resolved at {0}")]
    MissingEntryPoint(PathBuf),
    #[error("extra archive {0} does not exist")]
    MissingArchive(PathBuf),

    // bootstrap
    #[error("bootstrap line {line}: load path {path} is not present in the artifact")]
    Bootstrap { line: usize, path: String },
    #[error("bootstrap line {line}: cannot parse {text:?}")]
    MalformedBootstrap { line: usize, text: String },

    // lifecycle
    #[error("{role} {hook} hook failed")]
    Lifecycle {
        role: Role,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{role} cannot move from {from} to {to}")]
    IllegalState { role: Role, from: &'static str, to: &'static str },

    // conversion
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("partitioner returned {partition}, expected a value in [0, {num_partitions})")]
    PartitionOutOfRange { partition: i64, num_partitions: usize },

    // registry and container
    #[error("no {kind} registered under {name:?}")]
    UnknownClass { kind: &'static str, name: String },
    #[error("instance cached for {role} has a different type")]
    RoleMismatch { role: Role },

    // host
    #[error("task {task} failed after {attempts} attempt(s)")]
    TaskFailed {
        task: String,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl JobjarError {
    pub fn conversion(msg: impl Into<String>) -> Self {
        JobjarError::Conversion(msg.into())
    }
}
