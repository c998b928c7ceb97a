use gt_core::RegistryError;
use gt_routing::{RedirectError, RouteError};
use gt_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    #[error("check cannot be fixed automatically")]
    CannotFix,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Redirect(#[from] RedirectError),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("{0}")]
    Refused(String),
    #[error("{}", .0.join("; "))]
    Multiple(Vec<String>),
}

impl FixError {
    /// Folds per-unit failures into one error so none of them is lost.
    pub fn collect(failures: Vec<String>) -> Result<(), FixError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FixError::Multiple(failures))
        }
    }
}
