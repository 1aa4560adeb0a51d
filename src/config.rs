//! Stager configuration with builder pattern

use crate::convert::{QemuImgConverter, VolumeFormat};
use crate::datastore::{Datastore, GovcConfig, GovcDatastore, LocalDatastore};
use crate::models::Infrastructure;
use crate::orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which datastore backend to stage onto
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatastoreConfig {
    /// Mounted datastore directory
    Local { root: PathBuf },
    /// vSphere through govc
    Govc(GovcConfig),
}

impl DatastoreConfig {
    pub fn connect(&self) -> Arc<dyn Datastore> {
        match self {
            DatastoreConfig::Local { root } => Arc::new(LocalDatastore::new(root)),
            DatastoreConfig::Govc(config) => Arc::new(GovcDatastore::new(config.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub tmp_dir: PathBuf,
    pub image_root: String,
    pub volume_format: VolumeFormat,
    pub infrastructure: Infrastructure,
    pub qemu_img: PathBuf,
    pub datastore: DatastoreConfig,
}

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = "/var/lib/image-stager";

impl Default for Config {
    fn default() -> Self {
        let state_dir = PathBuf::from(DEFAULT_STATE_DIR);
        Self {
            catalog_path: state_dir.join("catalog.json"),
            tmp_dir: std::env::temp_dir().join("image-stager"),
            image_root: "stager/images".to_string(),
            volume_format: VolumeFormat::Vmdk,
            infrastructure: Infrastructure::Vsphere,
            qemu_img: PathBuf::from("qemu-img"),
            datastore: DatastoreConfig::Local {
                root: state_dir.join("datastore"),
            },
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.catalog_path.as_os_str().is_empty() {
            return Err(crate::Error::Config("catalog_path cannot be empty".into()));
        }
        if self.tmp_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("tmp_dir cannot be empty".into()));
        }
        if self.image_root.contains("..") {
            return Err(crate::Error::Config("image_root cannot contain '..'".into()));
        }
        if let DatastoreConfig::Govc(govc) = &self.datastore {
            if govc.url.is_empty() || govc.datastore.is_empty() {
                return Err(crate::Error::Config(
                    "govc datastore needs url and datastore".into(),
                ));
            }
            // import.vmdk is the only upload path govc offers
            if self.volume_format != VolumeFormat::Vmdk {
                return Err(crate::Error::Config(format!(
                    "govc datastore only imports vmdk volumes, not {}",
                    self.volume_format
                )));
            }
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new()
            .tmp_dir(&self.tmp_dir)
            .image_root(&self.image_root)
            .volume_format(self.volume_format)
            .infrastructure(self.infrastructure)
    }

    pub fn converter(&self) -> QemuImgConverter {
        QemuImgConverter::new(&self.qemu_img)
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = path.into();
        self
    }

    pub fn tmp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tmp_dir = path.into();
        self
    }

    pub fn image_root(mut self, root: impl Into<String>) -> Self {
        self.config.image_root = root.into();
        self
    }

    pub fn volume_format(mut self, format: VolumeFormat) -> Self {
        self.config.volume_format = format;
        self
    }

    pub fn infrastructure(mut self, infrastructure: Infrastructure) -> Self {
        self.config.infrastructure = infrastructure;
        self
    }

    pub fn qemu_img(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.qemu_img = path.into();
        self
    }

    pub fn local_datastore(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.datastore = DatastoreConfig::Local { root: root.into() };
        self
    }

    pub fn govc_datastore(mut self, govc: GovcConfig) -> Self {
        self.config.datastore = DatastoreConfig::Govc(govc);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<Config> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
