//! Remote datastore access
//!
//! The staging pipeline only needs three operations from the hypervisor's
//! storage: create a directory, remove a directory tree, and import a boot
//! volume into a directory. Failures are classified here so callers never
//! inspect message text.

mod govc;
mod local;

pub use govc::{GovcConfig, GovcDatastore};
pub use local::LocalDatastore;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
}

impl DatastoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DatastoreError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatastoreError::NotFound(_))
    }
}

/// Directory lifecycle and volume import on a hypervisor datastore
#[cfg_attr(test, mockall::automock)]
pub trait Datastore: Send + Sync {
    /// Create `path`. Fails with `AlreadyExists` if it is already there.
    fn create_directory(&self, path: &str) -> Result<(), DatastoreError>;

    /// Remove `path` and everything under it
    fn remove_directory(&self, path: &str) -> Result<(), DatastoreError>;

    /// Upload the volume at `local_path` into the directory `remote_dir`
    fn import_volume(&self, local_path: &Path, remote_dir: &str) -> Result<(), DatastoreError>;
}

/// Deterministic datastore directory for an image
pub fn image_dir(image_root: &str, name: &str) -> String {
    let root = image_root.trim_end_matches('/');
    if root.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", root, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_dir() {
        assert_eq!(image_dir("stager/images", "web1"), "stager/images/web1");
        assert_eq!(image_dir("stager/images/", "web1"), "stager/images/web1");
        assert_eq!(image_dir("", "web1"), "web1");
    }

    #[test]
    fn test_classification() {
        assert!(DatastoreError::AlreadyExists("x".into()).is_already_exists());
        assert!(DatastoreError::NotFound("x".into()).is_not_found());
        assert!(!DatastoreError::NotFound("x".into()).is_already_exists());
    }
}
