//! Layered simplex noise parameters.

use serde::{Deserialize, Serialize};

use super::layout::SimplexRecord;

/// Simplex noise family parameters (one set per generation run)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexSettings {
    /// Seed for the per-layer offset stream
    pub seed: i32,

    /// Number of octaves; also the number of random offsets uploaded
    pub num_layers: i32,

    /// Base sampling frequency (cycles per volume side)
    pub scale: f32,

    /// Amplitude falloff per layer (dimensionless)
    pub persistence: f32,

    /// Frequency growth per layer (dimensionless, > 0)
    pub lacunarity: f32,

    /// Contribution of this family to the blended channel
    pub weight: f32,
}

impl Default for SimplexSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            num_layers: 6,
            scale: 1.0,
            persistence: 0.5,
            lacunarity: 2.0,
            weight: 1.0,
        }
    }
}

impl SimplexSettings {
    /// Packed record size in bytes (wire contract with the kernel)
    pub const PACKED_SIZE: usize = SimplexRecord::SIZE;

    /// Number of offset vectors this family uploads
    ///
    /// Negative layer counts produce no offsets.
    pub fn offset_count(&self) -> usize {
        usize::try_from(self.num_layers).unwrap_or(0)
    }

    /// Pack into the fixed kernel record
    pub fn pack(&self) -> SimplexRecord {
        SimplexRecord {
            seed: self.seed,
            num_layers: self.num_layers,
            scale: self.scale,
            persistence: self.persistence,
            lacunarity: self.lacunarity,
            weight: self.weight,
            _padding: [0; 2],
        }
    }
}
