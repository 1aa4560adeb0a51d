//! Persistent image catalog
//!
//! Images are kept in memory and flushed as JSON with atomic writes
//! (write to a tmp file, then rename) so a crash never leaves a torn file.

use crate::models::Image;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// On-disk layout of the catalog file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    images: HashMap<String, Image>,
}

/// Catalog of staged images, keyed by name
pub struct ImageCatalog {
    path: Option<PathBuf>,
    images: Mutex<HashMap<String, Image>>,
    save_lock: Mutex<()>,
}

impl ImageCatalog {
    /// Open the catalog at `path`. A missing file is an empty catalog.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let images = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let file: CatalogFile = serde_json::from_str(&data)?;
            file.images
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), images = images.len(), "Loaded image catalog");

        Ok(Self {
            path: Some(path),
            images: Mutex::new(images),
            save_lock: Mutex::new(()),
        })
    }

    /// Catalog without a backing file (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            images: Mutex::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All images, sorted by name
    pub fn list(&self) -> Vec<Image> {
        let mut images: Vec<_> = self.images.lock().values().cloned().collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        images
    }

    pub fn get(&self, name: &str) -> Option<Image> {
        self.images.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }

    /// Apply `f` to the image map under exclusive access.
    ///
    /// `f` works on a copy; its changes become visible only if it returns `Ok`.
    pub fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Image>) -> Result<()>,
    {
        let mut images = self.images.lock();
        let mut next = images.clone();
        f(&mut next)?;
        *images = next;
        Ok(())
    }

    /// Flush the current state to disk. No-op for in-memory catalogs.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Saves are serialized so the file always ends on the latest snapshot.
        let _guard = self.save_lock.lock();
        let images = self.images.lock().clone();
        write_catalog(path, &images)
    }

    /// Apply `f` and persist the result as one step.
    ///
    /// The new map is published only once it is on disk, so a failed write
    /// leaves both memory and file as they were.
    pub fn modify_and_save<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Image>) -> Result<()>,
    {
        let _guard = self.save_lock.lock();
        let mut images = self.images.lock();
        let mut next = images.clone();
        f(&mut next)?;
        if let Some(path) = &self.path {
            write_catalog(path, &next)?;
        }
        *images = next;
        Ok(())
    }
}

fn write_catalog(path: &Path, images: &HashMap<String, Image>) -> Result<()> {
    let file = CatalogFile {
        images: images.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        Error::Io(e)
    })?;

    tracing::debug!(path = %path.display(), images = images.len(), "Saved image catalog");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceMapping, Infrastructure};
    use tempfile::TempDir;

    fn image(name: &str) -> Image {
        Image::staged(
            name,
            vec![DeviceMapping::new("/", "/dev/sda")],
            10,
            Infrastructure::Vsphere,
        )
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let catalog = ImageCatalog::open(temp.path().join("catalog.json")).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("catalog.json");

        let catalog = ImageCatalog::open(&path).unwrap();
        catalog
            .modify(|images| {
                images.insert("web1".into(), image("web1"));
                images.insert("db".into(), image("db"));
                Ok(())
            })
            .unwrap();
        catalog.save().unwrap();

        let reopened = ImageCatalog::open(&path).unwrap();
        let names: Vec<_> = reopened.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["db", "web1"]);
        assert_eq!(reopened.get("web1").unwrap(), catalog.get("web1").unwrap());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_modify_leaves_map_untouched() {
        let catalog = ImageCatalog::in_memory();
        catalog
            .modify(|images| {
                images.insert("web1".into(), image("web1"));
                Ok(())
            })
            .unwrap();

        let result = catalog.modify(|images| {
            images.remove("web1");
            images.insert("web2".into(), image("web2"));
            Err(Error::Config("rejected".into()))
        });

        assert!(result.is_err());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("web1").is_some());
        assert!(catalog.get("web2").is_none());
    }

    #[test]
    fn test_save_fails_when_parent_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let catalog = ImageCatalog::open(blocker.join("catalog.json")).unwrap();
        assert!(catalog.save().is_err());
    }

    #[test]
    fn test_modify_and_save_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.json");
        let catalog = ImageCatalog::open(&path).unwrap();

        catalog
            .modify_and_save(|images| {
                images.insert("web1".into(), image("web1"));
                Ok(())
            })
            .unwrap();

        assert!(catalog.get("web1").is_some());
        assert!(ImageCatalog::open(&path).unwrap().get("web1").is_some());
    }

    #[test]
    fn test_failed_write_is_not_published() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let catalog = ImageCatalog::open(blocker.join("catalog.json")).unwrap();

        let result = catalog.modify_and_save(|images| {
            images.insert("web1".into(), image("web1"));
            Ok(())
        });

        assert!(result.is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let catalog = ImageCatalog::in_memory();
        assert!(catalog.path().is_none());
        catalog.save().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(ImageCatalog::open(&path), Err(Error::Json(_))));
    }
}
