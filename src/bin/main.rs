//! Image Stager CLI

use clap::{Parser, Subcommand};
use image_stager::models::DeviceMapping;
use image_stager::{Config, ImageCatalog, Orchestrator, RawImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "image-stager")]
#[command(about = "Stage raw disk images as boot volumes on a hypervisor datastore", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, upload and register a raw image
    Stage {
        /// Image name
        #[arg(short, long)]
        name: String,
        /// Path to the raw disk image
        #[arg(short, long)]
        raw: PathBuf,
        /// Device mapping, MOUNT_POINT=DEVICE (repeatable)
        #[arg(short, long = "mount")]
        mounts: Vec<DeviceMapping>,
        /// Replace an existing image with the same name
        #[arg(short, long)]
        force: bool,
    },
    /// List staged images
    Images,
    /// Delete a staged image
    Rm {
        /// Image name
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let orchestrator = build_orchestrator(&config)?;

    match cli.command {
        Commands::Stage { name, raw, mounts, force } => {
            cmd_stage(&orchestrator, &name, raw, mounts, force)?;
        }
        Commands::Images => {
            cmd_images(&orchestrator);
        }
        Commands::Rm { name } => {
            cmd_rm(&orchestrator, &name)?;
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config) -> image_stager::Result<Orchestrator> {
    let catalog = ImageCatalog::open(&config.catalog_path)?;
    Ok(Orchestrator::new(
        config.datastore.connect(),
        Arc::new(config.converter()),
        Arc::new(catalog),
        config.orchestrator_config(),
    ))
}

fn cmd_stage(
    orchestrator: &Orchestrator,
    name: &str,
    raw: PathBuf,
    mounts: Vec<DeviceMapping>,
    force: bool,
) -> image_stager::Result<()> {
    let raw = RawImage::new(raw).with_device_mappings(mounts);
    let image = orchestrator.stage(name, &raw, force)?;

    println!("Staged image '{}'", image.name);
    println!("  Size: {} MB", image.size_mb);
    println!("  Infrastructure: {}", image.infrastructure);
    println!("  Datastore path: {}", orchestrator.image_dir(&image.name));
    Ok(())
}

fn cmd_images(orchestrator: &Orchestrator) {
    let images = orchestrator.list_images();
    if images.is_empty() {
        println!("No images found.");
        return;
    }

    println!("{:<30} {:<10} {:<10} {:<25}", "NAME", "SIZE (MB)", "INFRA", "CREATED");
    println!("{}", "-".repeat(78));
    for image in images {
        println!(
            "{:<30} {:<10} {:<10} {:<25}",
            image.name,
            image.size_mb,
            image.infrastructure,
            image.created.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn cmd_rm(orchestrator: &Orchestrator, name: &str) -> image_stager::Result<()> {
    orchestrator.delete_image(name)?;
    println!("Deleted image '{}'", name);
    Ok(())
}
