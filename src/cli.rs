//! Command-line arguments of the dispatch client

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dispatch_shared::protocol::{MedicineDeclaration, UploadPart};
use dispatch_shared::DroneModel;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "dispatch-client")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Register drones, load medicines and inspect drones on a dispatch server")]
pub struct Cli {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub server: String,

    /// Connection timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub connect_timeout_ms: u64,

    /// Time to wait for each response, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new drone
    Register {
        serial_number: String,
        #[arg(long, value_enum)]
        model: ModelArg,
        /// Weight limit in grams (1-500)
        #[arg(long)]
        weight_limit: i64,
        /// Battery level in percent (0-100)
        #[arg(long)]
        battery: i64,
    },
    /// Load medicines onto an idle drone
    Load {
        serial_number: String,
        /// Cargo item as NAME:WEIGHT:CODE:IMAGE_PATH (repeatable)
        #[arg(long = "item", required = true)]
        items: Vec<MedicineItem>,
    },
    /// Show a drone and its cargo
    Get { serial_number: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Lightweight,
    Middleweight,
    Cruiserweight,
    Heavyweight,
}

impl From<ModelArg> for DroneModel {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Lightweight => DroneModel::Lightweight,
            ModelArg::Middleweight => DroneModel::Middleweight,
            ModelArg::Cruiserweight => DroneModel::Cruiserweight,
            ModelArg::Heavyweight => DroneModel::Heavyweight,
        }
    }
}

/// One cargo item given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineItem {
    pub declaration: MedicineDeclaration,
    pub image_path: PathBuf,
}

impl FromStr for MedicineItem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // The image path is last so that it may itself contain ':'
        let mut fields = s.splitn(4, ':');
        let (Some(name), Some(weight), Some(code), Some(path)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            bail!("expected NAME:WEIGHT:CODE:IMAGE_PATH, got {:?}", s);
        };

        let weight_grams = weight
            .trim()
            .parse::<i64>()
            .map_err(|e| anyhow!("invalid weight {:?}: {}", weight, e))?;
        if path.is_empty() {
            bail!("missing image path in {:?}", s);
        }

        Ok(Self {
            declaration: MedicineDeclaration {
                name: name.to_string(),
                weight_grams,
                code: code.to_string(),
            },
            image_path: PathBuf::from(path),
        })
    }
}

impl MedicineItem {
    /// Name the server expects for this item's image: `<CODE>.<ext>`
    pub fn image_filename(&self) -> String {
        match self.image_path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{}.{}", self.declaration.code, ext),
            None => self.declaration.code.clone(),
        }
    }
}

fn content_type_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg".into()),
        "png" => Some("image/png".into()),
        _ => None,
    }
}

/// Build the upload: every declaration first, then every image read from disk
pub async fn build_parts(items: &[MedicineItem]) -> Result<Vec<UploadPart>> {
    let mut parts = Vec::with_capacity(items.len() * 2);

    for item in items {
        parts.push(UploadPart::declaration(&item.declaration)?);
    }

    for item in items {
        let data = tokio::fs::read(&item.image_path)
            .await
            .with_context(|| format!("reading image {}", item.image_path.display()))?;
        let mut part = UploadPart::image(item.image_filename(), data);
        part.content_type = content_type_of(&item.image_path);
        parts.push(part);
    }

    Ok(parts)
}
