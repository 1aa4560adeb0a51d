//! Staging orchestrator
//!
//! Turns a raw disk image into a registered boot volume:
//! convert locally, upload into a per-image datastore directory, record it in
//! the catalog. An image is in the catalog iff its directory exists on the
//! datastore, so every failure after the directory is created removes it again.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::ImageCatalog;
use crate::convert::{Converter, VolumeFormat};
use crate::datastore::{self, Datastore};
use crate::models::{Image, Infrastructure, RawImage};
use crate::{Error, Result};

const MB_SHIFT: u32 = 20;

/// Size in whole MiB, rounded down
pub fn size_mb(bytes: u64) -> u64 {
    bytes >> MB_SHIFT
}

/// Stages images onto a datastore and records them in the catalog
pub struct Orchestrator {
    datastore: Arc<dyn Datastore>,
    converter: Arc<dyn Converter>,
    catalog: Arc<ImageCatalog>,
    config: OrchestratorConfig,
    /// Names with a `stage` call in progress
    in_flight: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        converter: Arc<dyn Converter>,
        catalog: Arc<ImageCatalog>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            datastore,
            converter,
            catalog,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Datastore directory holding the boot volume of `name`
    pub fn image_dir(&self, name: &str) -> String {
        datastore::image_dir(&self.config.image_root, name)
    }

    /// All registered images, sorted by name
    pub fn list_images(&self) -> Vec<Image> {
        self.catalog.list()
    }

    /// Convert `raw` into a boot volume, upload it and register it as `name`.
    ///
    /// With `force`, an existing image of the same name is deleted first.
    pub fn stage(&self, name: &str, raw: &RawImage, force: bool) -> Result<Image> {
        validate_name(name)?;
        let _reservation = NameReservation::acquire(&self.in_flight, name)?;

        if let Some(existing) = self.catalog.get(name) {
            if !force {
                return Err(Error::NameConflict(name.to_string()));
            }
            tracing::warn!(image = %name, created = %existing.created, "force: deleting previous image");
            self.delete_image(name).map_err(|e| Error::CleanupFailed {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        }

        let remote_dir = self.image_dir(name);
        match self.datastore.create_directory(&remote_dir) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                tracing::debug!(image = %name, path = %remote_dir, "Datastore directory already exists");
            }
            Err(source) => {
                return Err(Error::RemoteAllocationFailed {
                    path: remote_dir,
                    source,
                })
            }
        }

        let rollback = RemoteDirGuard::new(self.datastore.as_ref(), &remote_dir);
        let image = self.convert_and_register(name, raw, &remote_dir)?;
        rollback.disarm();

        tracing::info!(image = %image.name, size_mb = image.size_mb, "Image created successfully");
        Ok(image)
    }

    /// Every step between directory creation and a committed catalog entry
    fn convert_and_register(&self, name: &str, raw: &RawImage, remote_dir: &str) -> Result<Image> {
        std::fs::create_dir_all(&self.config.tmp_dir).map_err(|source| Error::LocalIoFailed {
            context: "Creating tmp directory",
            path: self.config.tmp_dir.clone(),
            source,
        })?;
        let local_dir = tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&self.config.tmp_dir)
            .map_err(|source| Error::LocalIoFailed {
                context: "Creating tmp directory",
                path: self.config.tmp_dir.clone(),
                source,
            })?;
        let volume = local_dir.path().join(self.config.volume_format.boot_file_name());

        tracing::info!(
            image = %name,
            raw_image = %raw.local_image_path.display(),
            format = %self.config.volume_format,
            "Creating boot volume from raw image"
        );
        self.converter
            .convert(self.config.volume_format, &raw.local_image_path, &volume)
            .map_err(|source| Error::ConversionFailed {
                format: self.config.volume_format,
                source,
            })?;

        let size_mb = volume_size_mb(&volume)?;

        tracing::info!(image = %name, size_mb, path = %remote_dir, "Importing boot volume to datastore");
        self.datastore
            .import_volume(&volume, remote_dir)
            .map_err(|source| Error::UploadFailed {
                path: remote_dir.to_string(),
                source,
            })?;

        let image = Image::staged(
            name,
            raw.device_mappings.clone(),
            size_mb,
            self.config.infrastructure,
        );
        self.commit(&image)?;
        Ok(image)
    }

    fn commit(&self, image: &Image) -> Result<()> {
        self.catalog
            .modify_and_save(|images| {
                images.insert(image.name.clone(), image.clone());
                Ok(())
            })
            .map_err(|e| Error::CatalogCommitFailed {
                context: "Saving image map to catalog",
                source: Box::new(e),
            })
    }

    /// Remove an image's datastore directory, then its catalog entry.
    ///
    /// If the datastore refuses, the catalog is left untouched.
    pub fn delete_image(&self, name: &str) -> Result<()> {
        if self.catalog.get(name).is_none() {
            return Err(Error::ImageNotFound(name.to_string()));
        }

        let remote_dir = self.image_dir(name);
        match self.datastore.remove_directory(&remote_dir) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(image = %name, path = %remote_dir, "Datastore directory already gone");
            }
            Err(e) => return Err(e.into()),
        }

        self.catalog.modify_and_save(|images| {
            images.remove(name);
            Ok(())
        })?;

        tracing::info!(image = %name, "Image deleted");
        Ok(())
    }
}

fn volume_size_mb(volume: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(volume).map_err(|source| Error::LocalIoFailed {
        context: "Reading converted volume size",
        path: volume.to_path_buf(),
        source,
    })?;
    Ok(size_mb(metadata.len()))
}

/// Image names double as datastore directory names
fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name cannot be empty")
    } else if name == "." || name == ".." {
        Some("name cannot be a relative path")
    } else if name.contains(|c: char| c == '/' || c == '\\') {
        Some("name cannot contain path separators")
    } else if name.chars().any(char::is_control) {
        Some("name cannot contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Exclusive claim on an image name for the duration of one `stage` call
struct NameReservation<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> NameReservation<'a> {
    /// Fails with `NameConflict` if another call is staging `name`
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, name: &str) -> Result<Self> {
        if !in_flight.lock().insert(name.to_string()) {
            tracing::warn!(image = %name, "Image is already being staged");
            return Err(Error::NameConflict(name.to_string()));
        }
        Ok(Self {
            in_flight,
            name: name.to_string(),
        })
    }
}

impl Drop for NameReservation<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.name);
    }
}

/// Removes a datastore directory on drop unless disarmed
struct RemoteDirGuard<'a> {
    datastore: &'a dyn Datastore,
    path: String,
    armed: bool,
}

impl<'a> RemoteDirGuard<'a> {
    fn new(datastore: &'a dyn Datastore, path: &str) -> Self {
        Self {
            datastore,
            path: path.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RemoteDirGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(path = %self.path, "Creating image failed, cleaning up image on datastore");
        if let Err(e) = self.datastore.remove_directory(&self.path) {
            tracing::warn!(path = %self.path, error = %e, "Failed to clean up image on datastore");
        }
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Parent of the per-call conversion directories
    pub tmp_dir: PathBuf,
    /// Datastore directory under which each image gets `<name>/`
    pub image_root: String,
    pub volume_format: VolumeFormat,
    pub infrastructure: Infrastructure,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir().join("image-stager"),
            image_root: "stager/images".to_string(),
            volume_format: VolumeFormat::Vmdk,
            infrastructure: Infrastructure::Vsphere,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tmp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_dir = path.into();
        self
    }

    pub fn image_root(mut self, root: impl Into<String>) -> Self {
        self.image_root = root.into();
        self
    }

    pub fn volume_format(mut self, format: VolumeFormat) -> Self {
        self.volume_format = format;
        self
    }

    pub fn infrastructure(mut self, infrastructure: Infrastructure) -> Self {
        self.infrastructure = infrastructure;
        self
    }
}
