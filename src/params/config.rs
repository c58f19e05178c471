//! Generation pass configuration and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::simplex::SimplexSettings;
use super::worley::{self, WorleySettings, MAX_TOTAL_POINTS};
use crate::error::{NoiseError, NoiseResult};

/// Largest accepted volume side (wgpu's default `max_texture_dimension_3d`)
pub const MAX_RESOLUTION: i32 = 2048;

/// Everything one generation pass consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudNoiseConfig {
    /// Base volume side length (texels)
    pub base_resolution: i32,

    /// Detail volume side length (texels)
    pub detail_resolution: i32,

    /// Dispatch the base volume kernel (detail is always dispatched)
    pub update_base_noise: bool,

    /// Block on a readback after dispatch and report pass timing
    pub log_compute_time: bool,

    /// Free-form vector uniform forwarded to the kernel as `testParams`
    pub test_params: [f32; 4],

    pub simplex: SimplexSettings,
    pub worley: WorleySettings,

    /// Missing keys fall back to `WorleySettings::detail`, not `default`
    #[serde(
        default = "WorleySettings::detail",
        deserialize_with = "worley::deserialize_detail"
    )]
    pub detail_worley: WorleySettings,
}

impl Default for CloudNoiseConfig {
    fn default() -> Self {
        Self {
            base_resolution: 128,
            detail_resolution: 32,
            update_base_noise: true,
            log_compute_time: false,
            test_params: [0.0; 4],
            simplex: SimplexSettings::default(),
            worley: WorleySettings::default(),
            detail_worley: WorleySettings::detail(),
        }
    }
}

impl CloudNoiseConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> NoiseResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> NoiseResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| NoiseError::ConfigRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Base resolution as a texel count (valid only after `validate`)
    pub fn base_side(&self) -> u32 {
        self.base_resolution.max(0) as u32
    }

    /// Detail resolution as a texel count (valid only after `validate`)
    pub fn detail_side(&self) -> u32 {
        self.detail_resolution.max(0) as u32
    }

    /// Reject configurations the pipeline cannot run
    pub fn validate(&self) -> NoiseResult<()> {
        check_resolution("base_resolution", self.base_resolution)?;
        check_resolution("detail_resolution", self.detail_resolution)?;

        check_non_negative("simplex.num_layers", self.simplex.num_layers)?;
        check_lacunarity("simplex.lacunarity", self.simplex.lacunarity)?;

        check_worley("worley", &self.worley)?;
        check_worley("detail_worley", &self.detail_worley)
    }
}

fn check_resolution(field: &str, value: i32) -> NoiseResult<()> {
    if value <= 0 {
        return Err(NoiseError::invalid_config(field, value, "must be positive"));
    }
    if value > MAX_RESOLUTION {
        return Err(NoiseError::invalid_config(
            field,
            value,
            format!("must not exceed {}", MAX_RESOLUTION),
        ));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: i32) -> NoiseResult<()> {
    if value < 0 {
        return Err(NoiseError::invalid_config(field, value, "must not be negative"));
    }
    Ok(())
}

fn check_lacunarity(field: &str, value: f32) -> NoiseResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(NoiseError::invalid_config(
            field,
            value,
            "must be finite and positive",
        ));
    }
    Ok(())
}

fn check_worley(family: &str, settings: &WorleySettings) -> NoiseResult<()> {
    check_non_negative(&format!("{}.num_layers", family), settings.num_layers)?;
    check_non_negative(&format!("{}.num_points", family), settings.num_points)?;
    check_lacunarity(&format!("{}.lacunarity", family), settings.lacunarity)?;

    let total = settings.total_point_count();
    if total > MAX_TOTAL_POINTS {
        return Err(NoiseError::invalid_config(
            format!("{}.num_points", family),
            total,
            format!("total point count exceeds {}", MAX_TOTAL_POINTS),
        ));
    }
    Ok(())
}
