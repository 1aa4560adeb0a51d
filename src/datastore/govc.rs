//! vSphere datastore access through the `govc` CLI

use super::{Datastore, DatastoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Connection settings for govc
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovcConfig {
    /// vCenter / ESXi URL, e.g. `https://vcenter.local/sdk`
    pub url: String,
    pub username: String,
    pub password: String,
    /// Datastore name passed as `-ds`
    pub datastore: String,
    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_govc_program")]
    pub program: PathBuf,
}

fn default_govc_program() -> PathBuf {
    PathBuf::from("govc")
}

/// Datastore operations through govc
#[derive(Debug, Clone)]
pub struct GovcDatastore {
    config: GovcConfig,
}

impl GovcDatastore {
    pub fn new(config: GovcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovcConfig {
        &self.config
    }

    fn ds_flag(&self) -> String {
        format!("-ds={}", self.config.datastore)
    }

    /// Run a govc subcommand, classifying failures by what govc reports
    fn govc(&self, subcommand: &str, args: &[String], target: &str) -> Result<String, DatastoreError> {
        let output = Command::new(&self.config.program)
            .arg(subcommand)
            .args(args)
            .env("GOVC_URL", &self.config.url)
            .env("GOVC_USERNAME", &self.config.username)
            .env("GOVC_PASSWORD", &self.config.password)
            .env("GOVC_INSECURE", if self.config.insecure { "1" } else { "0" })
            .output()
            .map_err(|source| DatastoreError::Io {
                path: self.config.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(subcommand, target, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Map govc's stderr onto a structured error
fn classify(subcommand: &str, target: &str, stderr: &str) -> DatastoreError {
    let lower = stderr.to_lowercase();
    if lower.contains("already exists") || lower.contains("fileexists") {
        DatastoreError::AlreadyExists(target.to_string())
    } else if lower.contains("not found") || lower.contains("filenotfound") {
        DatastoreError::NotFound(target.to_string())
    } else {
        DatastoreError::Command {
            command: format!("govc {}", subcommand),
            message: stderr.trim().to_string(),
        }
    }
}

impl Datastore for GovcDatastore {
    fn create_directory(&self, path: &str) -> Result<(), DatastoreError> {
        self.govc(
            "datastore.mkdir",
            &[self.ds_flag(), "-p".to_string(), path.to_string()],
            path,
        )?;
        // `-p` succeeds silently on existing directories
        Ok(())
    }

    fn remove_directory(&self, path: &str) -> Result<(), DatastoreError> {
        self.govc(
            "datastore.rm",
            &[self.ds_flag(), "-f".to_string(), path.to_string()],
            path,
        )?;
        Ok(())
    }

    fn import_volume(&self, local_path: &Path, remote_dir: &str) -> Result<(), DatastoreError> {
        self.govc(
            "import.vmdk",
            &[
                self.ds_flag(),
                local_path.to_string_lossy().into_owned(),
                remote_dir.to_string(),
            ],
            remote_dir,
        )?;
        Ok(())
    }
}
