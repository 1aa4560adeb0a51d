//! Image Stager
//!
//! Turns locally-built raw disk images into boot volumes on a hypervisor
//! datastore and records them in a persistent image catalog.
//!
//! Staging converts the raw image (via `qemu-img` or any [`Converter`]),
//! uploads the result into a per-image datastore directory, and registers the
//! image. If any step after the directory is created fails, the directory is
//! removed again so the catalog and the datastore never disagree.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use image_stager::{ImageCatalog, LocalDatastore, Orchestrator, OrchestratorConfig, QemuImgConverter, RawImage};
//! use image_stager::models::DeviceMapping;
//!
//! let catalog = Arc::new(ImageCatalog::open("/var/lib/image-stager/catalog.json")?);
//! let orchestrator = Orchestrator::new(
//!     Arc::new(LocalDatastore::new("/mnt/datastore1")),
//!     Arc::new(QemuImgConverter::default()),
//!     catalog,
//!     OrchestratorConfig::new(),
//! );
//!
//! let raw = RawImage::new("/build/web1.raw")
//!     .with_device_mapping(DeviceMapping::new("/", "/dev/sda"));
//! let image = orchestrator.stage("web1", &raw, false)?;
//! println!("staged {} ({} MB)", image.name, image.size_mb);
//! # Ok::<(), image_stager::Error>(())
//! ```

pub mod catalog;
pub mod config;
pub mod convert;
pub mod datastore;
pub mod error;
pub mod models;
pub mod orchestrator;

pub use catalog::ImageCatalog;
pub use config::Config;
pub use convert::{Converter, QemuImgConverter, VolumeFormat};
pub use datastore::{Datastore, DatastoreError, GovcDatastore, LocalDatastore};
pub use error::{Error, Result};
pub use models::{Image, Infrastructure, RawImage};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
