//! End-to-end staging against a directory-backed datastore and a file-backed catalog

use image_stager::convert::ConvertError;
use image_stager::models::DeviceMapping;
use image_stager::{
    Converter, Datastore, Error, ImageCatalog, LocalDatastore, Orchestrator, OrchestratorConfig,
    RawImage, VolumeFormat,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const MB: u64 = 1 << 20;

/// Copies the raw image as-is, standing in for qemu-img
struct CopyConverter;

impl Converter for CopyConverter {
    fn convert(&self, _format: VolumeFormat, source: &Path, dest: &Path) -> Result<(), ConvertError> {
        if !source.exists() {
            return Err(ConvertError::MissingSource(source.to_path_buf()));
        }
        std::fs::copy(source, dest).map_err(|source| ConvertError::Spawn {
            program: "copy".into(),
            source,
        })?;
        Ok(())
    }
}

struct Env {
    temp: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn datastore_root(&self) -> PathBuf {
        self.temp.path().join("datastore")
    }

    fn catalog_path(&self) -> PathBuf {
        self.temp.path().join("state").join("catalog.json")
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::new(LocalDatastore::new(self.datastore_root())),
            Arc::new(CopyConverter),
            Arc::new(ImageCatalog::open(self.catalog_path()).unwrap()),
            OrchestratorConfig::new().tmp_dir(self.temp.path().join("tmp")),
        )
    }

    /// Sparse raw image of `bytes` bytes
    fn raw_image(&self, name: &str, bytes: u64) -> RawImage {
        let path = self.temp.path().join(format!("{}.raw", name));
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(bytes).unwrap();
        RawImage::new(path).with_device_mapping(DeviceMapping::new("/", "/dev/sda"))
    }

    fn volume_path(&self, name: &str) -> PathBuf {
        self.datastore_root()
            .join("stager/images")
            .join(name)
            .join("boot.vmdk")
    }
}

#[test]
fn test_stage_persists_across_reopen() {
    let env = Env::new();
    let raw = env.raw_image("web1", 50 * MB);

    let image = env.orchestrator().stage("web1", &raw, false).unwrap();
    assert_eq!(image.size_mb, 50);
    assert_eq!(std::fs::metadata(env.volume_path("web1")).unwrap().len(), 50 * MB);

    let reopened = env.orchestrator();
    assert_eq!(reopened.list_images(), vec![image]);
}

#[test]
fn test_conflict_then_force() {
    let env = Env::new();
    let orch = env.orchestrator();
    orch.stage("web1", &env.raw_image("v1", 2 * MB), false).unwrap();

    let conflict = orch.stage("web1", &env.raw_image("v2", 3 * MB), false);
    assert!(matches!(conflict, Err(Error::NameConflict(_))));
    assert_eq!(orch.catalog().get("web1").unwrap().size_mb, 2);

    let replaced = orch.stage("web1", &env.raw_image("v2", 3 * MB), true).unwrap();
    assert_eq!(replaced.size_mb, 3);
    assert_eq!(orch.list_images().len(), 1);
    assert_eq!(std::fs::metadata(env.volume_path("web1")).unwrap().len(), 3 * MB);
}

#[test]
fn test_missing_raw_image_leaves_no_directory() {
    let env = Env::new();
    let orch = env.orchestrator();
    let raw = RawImage::new(env.temp.path().join("missing.raw"));

    let result = orch.stage("web1", &raw, false);

    assert!(matches!(result, Err(Error::ConversionFailed { .. })));
    assert!(!env.datastore_root().join("stager/images/web1").exists());
    assert!(orch.list_images().is_empty());
    assert!(!env.catalog_path().exists());
}

#[test]
fn test_orphaned_directory_is_reused() {
    let env = Env::new();
    LocalDatastore::new(env.datastore_root())
        .create_directory("stager/images/web1")
        .unwrap();

    let orch = env.orchestrator();
    orch.stage("web1", &env.raw_image("web1", MB), false).unwrap();

    assert!(env.volume_path("web1").exists());
}

#[test]
fn test_delete_removes_volume_and_entry() {
    let env = Env::new();
    let orch = env.orchestrator();
    orch.stage("web1", &env.raw_image("web1", MB), false).unwrap();

    orch.delete_image("web1").unwrap();

    assert!(!env.datastore_root().join("stager/images/web1").exists());
    assert!(env.orchestrator().list_images().is_empty());
}
