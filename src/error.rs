use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Could not resolve working directory '{}': {source}", path.display())]
    PathResolution {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("{0}")]
    CommandFailed(String),

    #[error("{operation} is not implemented for {vcs}")]
    UnsupportedOperation {
        vcs: &'static str,
        operation: &'static str,
    },

    #[error("Unknown VCS '{0}'")]
    UnsupportedVcs(String),

    #[error("Path has no parent directory or final component: {0}")]
    InvalidPath(PathBuf),

    #[error("Could not read config file '{0}': {1}")]
    ConfigRead(String, std::io::Error),
}
