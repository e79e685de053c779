//! Plumbing shared by the command-line binaries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use vf_core::{PopulationSnapshot, PopulationSource};

/// Reads a JSON config file, or the type's defaults when no path is given.
pub fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(T::default()),
    }
}

/// Population flags; they override whatever the config file says.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PopulationArgs {
    /// JSON snapshot of equipment and lots to start from instead of a synthetic fab
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// Number of synthetic tools
    #[arg(long)]
    pub equipments: Option<usize>,
    /// Number of synthetic lots
    #[arg(long)]
    pub lots: Option<usize>,
}

impl PopulationArgs {
    pub fn resolve(&self, configured: PopulationSource) -> Result<PopulationSource> {
        if let Some(path) = &self.snapshot {
            let raw = fs::read_to_string(path).with_context(|| format!("reading snapshot {}", path.display()))?;
            let snapshot = PopulationSnapshot::from_json(&raw).with_context(|| format!("parsing snapshot {}", path.display()))?;
            return Ok(PopulationSource::Snapshot(snapshot));
        }
        match configured {
            PopulationSource::Synthetic(mut cfg) => {
                if let Some(n) = self.equipments {
                    cfg.num_equipments = n;
                }
                if let Some(n) = self.lots {
                    cfg.num_lots = n;
                }
                Ok(PopulationSource::Synthetic(cfg))
            }
            snapshot => Ok(snapshot),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
