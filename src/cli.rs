//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::error::NoiseResult;
use crate::params::CloudNoiseConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "cloudnoise")]
#[command(about = "Generate tileable base and detail cloud noise volumes", long_about = None)]
pub struct Args {
    /// TOML config file (missing keys use defaults)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base volume side length (texels)
    #[arg(long, value_name = "TEXELS")]
    pub base_resolution: Option<i32>,

    /// Detail volume side length (texels)
    #[arg(long, value_name = "TEXELS")]
    pub detail_resolution: Option<i32>,

    /// Skip dispatching the base volume kernel
    #[arg(long)]
    pub skip_base: bool,

    /// Block on the GPU and report pass timing
    #[arg(long)]
    pub log_time: bool,

    /// Record host calls instead of running on a GPU
    #[arg(long)]
    pub dry_run: bool,

    /// Write the middle z-slice of each volume as PNG into this directory
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides
    pub fn build_config(&self) -> NoiseResult<CloudNoiseConfig> {
        let mut config = match &self.config {
            Some(path) => CloudNoiseConfig::load(path)?,
            None => CloudNoiseConfig::default(),
        };

        if let Some(resolution) = self.base_resolution {
            config.base_resolution = resolution;
        }
        if let Some(resolution) = self.detail_resolution {
            config.detail_resolution = resolution;
        }
        if self.skip_base {
            config.update_base_noise = false;
        }
        if self.log_time {
            config.log_compute_time = true;
        }

        config.validate()?;
        Ok(config)
    }
}
