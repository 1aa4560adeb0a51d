//! Error types for image staging

use std::path::PathBuf;
use thiserror::Error;

use crate::convert::{ConvertError, VolumeFormat};
use crate::datastore::DatastoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("An image already exists with name '{0}', try again with force")]
    NameConflict(String),

    #[error("Removing previously existing image '{name}': {source}")]
    CleanupFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Creating datastore directory {path} for image: {source}")]
    RemoteAllocationFailed {
        path: String,
        #[source]
        source: DatastoreError,
    },

    #[error("Converting raw image to {format}: {source}")]
    ConversionFailed {
        format: VolumeFormat,
        #[source]
        source: ConvertError,
    },

    #[error("{context} ({}): {source}", .path.display())]
    LocalIoFailed {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Importing boot volume to datastore {path}: {source}")]
    UploadFailed {
        path: String,
        #[source]
        source: DatastoreError,
    },

    #[error("{context}: {source}")]
    CatalogCommitFailed {
        context: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid image name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Datastore error: {0}")]
    Datastore(#[from] DatastoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
