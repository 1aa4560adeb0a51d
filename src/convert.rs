//! Raw image to boot volume conversion

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Target boot volume format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeFormat {
    #[default]
    Vmdk,
    Qcow2,
    Vhdx,
    Raw,
}

impl VolumeFormat {
    /// Name understood by `qemu-img -O`
    pub fn qemu_name(&self) -> &'static str {
        match self {
            VolumeFormat::Vmdk => "vmdk",
            VolumeFormat::Qcow2 => "qcow2",
            VolumeFormat::Vhdx => "vhdx",
            VolumeFormat::Raw => "raw",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VolumeFormat::Vmdk => "vmdk",
            VolumeFormat::Qcow2 => "qcow2",
            VolumeFormat::Vhdx => "vhdx",
            VolumeFormat::Raw => "img",
        }
    }

    /// File name of the boot volume inside an image directory
    pub fn boot_file_name(&self) -> String {
        format!("boot.{}", self.extension())
    }
}

impl fmt::Display for VolumeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qemu_name())
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("source image {} does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Converts a raw disk image into a target volume format.
///
/// Reads `source`, writes `dest`; never touches remote storage.
#[cfg_attr(test, mockall::automock)]
pub trait Converter: Send + Sync {
    fn convert(&self, format: VolumeFormat, source: &Path, dest: &Path) -> Result<(), ConvertError>;
}

/// Converter backed by the `qemu-img` binary
#[derive(Debug, Clone)]
pub struct QemuImgConverter {
    program: PathBuf,
}

impl Default for QemuImgConverter {
    fn default() -> Self {
        Self::new("qemu-img")
    }
}

impl QemuImgConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to `qemu-img`
    pub fn args(format: VolumeFormat, source: &Path, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "convert".to_string(),
            "-f".to_string(),
            "raw".to_string(),
            "-O".to_string(),
            format.qemu_name().to_string(),
        ];
        // ESXi refuses the default vmdk subformat version
        if format == VolumeFormat::Vmdk {
            args.push("-o".to_string());
            args.push("compat6".to_string());
        }
        args.push(source.to_string_lossy().into_owned());
        args.push(dest.to_string_lossy().into_owned());
        args
    }
}

impl Converter for QemuImgConverter {
    fn convert(&self, format: VolumeFormat, source: &Path, dest: &Path) -> Result<(), ConvertError> {
        if !source.exists() {
            return Err(ConvertError::MissingSource(source.to_path_buf()));
        }

        let args = Self::args(format, source, dest);
        tracing::debug!(program = %self.program.display(), ?args, "Running converter");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
