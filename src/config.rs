//! Command line and environment configuration.

use std::path::{Path, PathBuf};

use clap::builder::FalseyValueParser;
use clap::Parser;

use crate::catalog::LabelCatalog;
use crate::reconcile::ExternalInput;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid initial annotations in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("the label catalog is empty")]
    NoLabels,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tn-annotate", about = "Bounding boxes and TN measurement for ultrasound frames")]
pub struct Cli {
    /// Image to annotate. A file picker opens when omitted.
    pub image: Option<PathBuf>,

    /// Segmentation mask drawn over the image.
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Structure labels, comma separated, in selector order.
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// JSON file with `rectangles`, `endpoints` and/or `pixelMmRatio` to start from.
    #[arg(long)]
    pub initial: Option<PathBuf>,

    /// Erase persisted annotations before loading. The variable accepts any
    /// value other than `0`, `false`, `no`, `off` or empty as set.
    #[arg(long, env = "TN_ANNOTATE_CLEAR", value_parser = FalseyValueParser::new())]
    pub clear_persisted: bool,

    /// Directory of the snapshot store.
    #[arg(long, env = "TN_ANNOTATE_STORE_DIR", default_value = ".")]
    pub store_dir: PathBuf,

    /// Millimeters per pixel; overrides the persisted value.
    #[arg(long)]
    pub pixel_mm_ratio: Option<f64>,
}

impl Cli {
    /// The label catalog, falling back to the built-in structures.
    pub fn catalog(&self) -> Result<LabelCatalog, ConfigError> {
        let labels: Vec<&str> = self
            .labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            if self.labels.is_empty() {
                return Ok(LabelCatalog::default());
            }
            return Err(ConfigError::NoLabels);
        }
        Ok(LabelCatalog::new(labels))
    }

    /// Host-supplied annotations from `--initial` plus `--pixel-mm-ratio`.
    pub fn external_input(&self) -> Result<ExternalInput, ConfigError> {
        let mut input = match &self.initial {
            Some(path) => load_initial(path)?,
            None => ExternalInput::default(),
        };
        if self.pixel_mm_ratio.is_some() {
            input.pixel_mm_ratio = self.pixel_mm_ratio;
        }
        Ok(input)
    }

    pub fn check_paths(&self) -> Result<(), ConfigError> {
        for path in self.image.iter().chain(self.mask.iter()) {
            if !path.exists() {
                return Err(ConfigError::Missing(path.clone()));
            }
        }
        Ok(())
    }
}

fn load_initial(path: &Path) -> Result<ExternalInput, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
