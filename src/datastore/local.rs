//! Datastore backed by a locally mounted directory (e.g. an NFS datastore)

use super::{Datastore, DatastoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalDatastore {
    root: PathBuf,
}

impl LocalDatastore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a datastore path
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn io_error(path: &str, source: std::io::Error) -> DatastoreError {
    match source.kind() {
        ErrorKind::AlreadyExists => DatastoreError::AlreadyExists(path.to_string()),
        ErrorKind::NotFound => DatastoreError::NotFound(path.to_string()),
        _ => DatastoreError::Io {
            path: path.to_string(),
            source,
        },
    }
}

impl Datastore for LocalDatastore {
    fn create_directory(&self, path: &str) -> Result<(), DatastoreError> {
        let dir = self.resolve(path);
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }
        std::fs::create_dir(&dir).map_err(|e| io_error(path, e))
    }

    fn remove_directory(&self, path: &str) -> Result<(), DatastoreError> {
        std::fs::remove_dir_all(self.resolve(path)).map_err(|e| io_error(path, e))
    }

    fn import_volume(&self, local_path: &Path, remote_dir: &str) -> Result<(), DatastoreError> {
        let dir = self.resolve(remote_dir);
        if !dir.is_dir() {
            return Err(DatastoreError::NotFound(remote_dir.to_string()));
        }
        let file_name = local_path.file_name().ok_or_else(|| DatastoreError::Io {
            path: local_path.display().to_string(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "volume path has no file name"),
        })?;

        let dest = dir.join(file_name);
        std::fs::copy(local_path, &dest).map_err(|source| DatastoreError::Io {
            path: dest.display().to_string(),
            source,
        })?;

        tracing::debug!(volume = %local_path.display(), dest = %dest.display(), "Imported volume");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_twice_reports_already_exists() {
        let temp = TempDir::new().unwrap();
        let ds = LocalDatastore::new(temp.path());

        ds.create_directory("images/web1").unwrap();
        assert!(temp.path().join("images/web1").is_dir());

        let err = ds.create_directory("images/web1").unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_remove_missing_reports_not_found() {
        let temp = TempDir::new().unwrap();
        let ds = LocalDatastore::new(temp.path());

        let err = ds.remove_directory("images/missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_import_and_remove() {
        let temp = TempDir::new().unwrap();
        let ds = LocalDatastore::new(temp.path().join("ds"));
        let volume = temp.path().join("boot.vmdk");
        std::fs::write(&volume, b"volume").unwrap();

        ds.create_directory("images/web1").unwrap();
        ds.import_volume(&volume, "images/web1").unwrap();
        assert_eq!(
            std::fs::read(ds.resolve("images/web1/boot.vmdk")).unwrap(),
            b"volume"
        );

        ds.remove_directory("images/web1").unwrap();
        assert!(!ds.resolve("images/web1").exists());
    }

    #[test]
    fn test_import_into_missing_directory() {
        let temp = TempDir::new().unwrap();
        let ds = LocalDatastore::new(temp.path());
        let volume = temp.path().join("boot.vmdk");
        std::fs::write(&volume, b"volume").unwrap();

        let err = ds.import_volume(&volume, "images/nope").unwrap_err();
        assert!(err.is_not_found());
    }
}
