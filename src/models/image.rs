//! Image model - boot volumes registered in the catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Virtualization backend an image was staged for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Infrastructure {
    #[default]
    Vsphere,
    Qemu,
    Hyperv,
}

impl fmt::Display for Infrastructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infrastructure::Vsphere => write!(f, "vsphere"),
            Infrastructure::Qemu => write!(f, "qemu"),
            Infrastructure::Hyperv => write!(f, "hyperv"),
        }
    }
}

/// Where a virtual device is mounted inside the guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    pub mount_point: String,
    pub device_name: String,
}

impl DeviceMapping {
    pub fn new(mount_point: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            device_name: device_name.into(),
        }
    }
}

/// Parses `MOUNT_POINT=DEVICE`, e.g. `/data=/dev/sdb`
impl FromStr for DeviceMapping {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let (mount_point, device_name) = s.split_once('=').ok_or_else(|| {
            crate::Error::Config(format!(
                "device mapping '{}' must look like MOUNT_POINT=DEVICE",
                s
            ))
        })?;
        if mount_point.is_empty() || device_name.is_empty() {
            return Err(crate::Error::Config(format!(
                "device mapping '{}' has an empty side",
                s
            )));
        }
        Ok(Self::new(mount_point, device_name))
    }
}

/// An unconverted disk image produced by an earlier build step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImage {
    /// Path to the raw disk artifact on the local filesystem
    pub local_image_path: PathBuf,
    /// Virtual device layout, carried over to the staged image
    pub device_mappings: Vec<DeviceMapping>,
}

impl RawImage {
    pub fn new(local_image_path: impl Into<PathBuf>) -> Self {
        Self {
            local_image_path: local_image_path.into(),
            device_mappings: vec![],
        }
    }

    pub fn with_device_mapping(mut self, mapping: DeviceMapping) -> Self {
        self.device_mappings.push(mapping);
        self
    }

    pub fn with_device_mappings(mut self, mappings: Vec<DeviceMapping>) -> Self {
        self.device_mappings = mappings;
        self
    }
}

/// A staged boot volume registered in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Unique identifier, equal to `name` for staged images
    pub id: String,
    /// Human-readable name, also the datastore directory name
    pub name: String,
    /// Device layout copied from the raw image
    pub device_mappings: Vec<DeviceMapping>,
    /// Size of the converted boot volume in whole MiB
    pub size_mb: u64,
    /// Backend the volume was staged on
    pub infrastructure: Infrastructure,
    /// Commit time
    pub created: DateTime<Utc>,
}

impl Image {
    /// Build the record for a freshly staged volume. `created` is now.
    pub fn staged(
        name: impl Into<String>,
        device_mappings: Vec<DeviceMapping>,
        size_mb: u64,
        infrastructure: Infrastructure,
    ) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            device_mappings,
            size_mb,
            infrastructure,
            created: Utc::now(),
        }
    }
}
