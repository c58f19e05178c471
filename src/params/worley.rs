//! Layered Worley (cellular) noise parameters.

use serde::{Deserialize, Deserializer, Serialize};

use super::layout::WorleyRecord;

/// Upper bound on scatter points for one family
///
/// Guards the point-count formula against runaway lacunarity before any
/// buffer is allocated.
pub const MAX_TOTAL_POINTS: usize = 1 << 20;

/// Worley noise family parameters (base and detail each own one)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorleySettings {
    /// Seed for the scatter point stream
    pub seed: i32,

    /// Number of cellular layers
    pub num_layers: i32,

    /// Points in the first layer
    pub num_points: i32,

    /// Point density growth per layer (dimensionless, > 0)
    pub lacunarity: f32,

    /// Amplitude falloff per layer
    pub persistence: f32,

    /// Contribution of this family to the blended channel
    pub weight: f32,

    /// Output 1 - distance instead of distance
    pub invert: bool,
}

impl Default for WorleySettings {
    fn default() -> Self {
        Self {
            seed: 0,
            num_layers: 3,
            num_points: 4,
            lacunarity: 3.0,
            persistence: 0.6,
            weight: 1.0,
            invert: true,
        }
    }
}

impl WorleySettings {
    /// Packed record size in bytes (wire contract with the kernel)
    pub const PACKED_SIZE: usize = WorleyRecord::SIZE;

    /// Denser defaults used for the detail volume
    pub fn detail() -> Self {
        Self {
            seed: 1,
            num_points: 10,
            lacunarity: 2.0,
            ..Self::default()
        }
    }

    /// Per-layer point counts, first layer first
    ///
    /// Layer i holds floor(num_points * frequency) points, where frequency
    /// starts at 1 and is multiplied by `lacunarity` in f32 after each
    /// layer. The kernel walks the same product, so both sides agree on
    /// where each layer starts in the point buffer.
    pub fn layer_point_counts(&self) -> impl Iterator<Item = usize> + '_ {
        let mut frequency = 1.0f32;
        (0..self.num_layers.max(0)).map(move |_| {
            let count = self.num_points as f32 * frequency;
            frequency *= self.lacunarity;
            if self.num_points > 0 && count.is_finite() && count > 0.0 {
                count.floor() as usize
            } else {
                0
            }
        })
    }

    /// Points in layer `layer` (0 past the last layer)
    pub fn layer_point_count(&self, layer: i32) -> usize {
        if layer < 0 {
            return 0;
        }
        self.layer_point_counts().nth(layer as usize).unwrap_or(0)
    }

    /// Total scatter points across all layers
    ///
    /// Used both to size the upload and by the kernel-side layer walk.
    pub fn total_point_count(&self) -> usize {
        self.layer_point_counts().fold(0usize, usize::saturating_add)
    }

    /// Pack into the fixed kernel record
    pub fn pack(&self) -> WorleyRecord {
        WorleyRecord {
            seed: self.seed,
            num_layers: self.num_layers,
            num_points: self.num_points,
            lacunarity: self.lacunarity,
            persistence: self.persistence,
            weight: self.weight,
            invert: self.invert as u32,
            _padding: 0,
        }
    }
}

/// Partial `WorleySettings` as read from a config table
#[derive(Debug, Deserialize)]
struct WorleyOverrides {
    seed: Option<i32>,
    num_layers: Option<i32>,
    num_points: Option<i32>,
    lacunarity: Option<f32>,
    persistence: Option<f32>,
    weight: Option<f32>,
    invert: Option<bool>,
}

impl WorleyOverrides {
    fn apply(self, base: WorleySettings) -> WorleySettings {
        WorleySettings {
            seed: self.seed.unwrap_or(base.seed),
            num_layers: self.num_layers.unwrap_or(base.num_layers),
            num_points: self.num_points.unwrap_or(base.num_points),
            lacunarity: self.lacunarity.unwrap_or(base.lacunarity),
            persistence: self.persistence.unwrap_or(base.persistence),
            weight: self.weight.unwrap_or(base.weight),
            invert: self.invert.unwrap_or(base.invert),
        }
    }
}

/// Deserialize a detail table, filling missing keys from `WorleySettings::detail`
pub(crate) fn deserialize_detail<'de, D>(deserializer: D) -> Result<WorleySettings, D::Error>
where
    D: Deserializer<'de>,
{
    WorleyOverrides::deserialize(deserializer).map(|o| o.apply(WorleySettings::detail()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_total(num_layers: i32, num_points: i32, lacunarity: f32) -> usize {
        let mut total = 0;
        let mut frequency = 1.0f32;
        for _ in 0..num_layers {
            total += (num_points as f32 * frequency).floor() as usize;
            frequency *= lacunarity;
        }
        total
    }

    #[test]
    fn test_total_point_count_matches_direct_loop() {
        let cases = [
            (0, 5, 2.0),
            (1, 5, 2.0),
            (3, 4, 3.0),
            (4, 7, 1.5),
            (5, 3, 1.0),
            (2, 10, 0.5),
            (2, 10, 0.7),
            (6, 3, 1.1),
        ];

        for (num_layers, num_points, lacunarity) in cases {
            let settings = WorleySettings {
                num_layers,
                num_points,
                lacunarity,
                ..Default::default()
            };
            assert_eq!(
                settings.total_point_count(),
                direct_total(num_layers, num_points, lacunarity),
                "layers={} points={} lacunarity={}",
                num_layers,
                num_points,
                lacunarity
            );
        }
    }

    #[test]
    fn test_fractional_lacunarity_uses_f32_product() {
        // 10 * 0.7f32 rounds to exactly 7.0 in f32; widening to f64 gives 6.99...
        let settings = WorleySettings {
            num_layers: 2,
            num_points: 10,
            lacunarity: 0.7,
            ..Default::default()
        };
        assert_eq!(settings.layer_point_count(0), 10);
        assert_eq!(settings.layer_point_count(1), 7);
        assert_eq!(settings.total_point_count(), 17);
    }

    #[test]
    fn test_layer_counts_sum_to_total() {
        let settings = WorleySettings::detail();
        let counts: Vec<usize> = settings.layer_point_counts().collect();
        assert_eq!(counts, vec![10, 20, 40]);
        assert_eq!(settings.layer_point_count(3), 0);
        assert_eq!(settings.layer_point_count(-1), 0);
        assert_eq!(counts.iter().sum::<usize>(), settings.total_point_count());
    }

    #[test]
    fn test_zero_layers_has_no_points() {
        let settings = WorleySettings {
            num_layers: 0,
            ..Default::default()
        };
        assert_eq!(settings.total_point_count(), 0);
    }

    #[test]
    fn test_unit_lacunarity_is_layers_times_points() {
        let settings = WorleySettings {
            num_layers: 5,
            num_points: 3,
            lacunarity: 1.0,
            ..Default::default()
        };
        assert_eq!(settings.total_point_count(), 15);
    }

    #[test]
    fn test_negative_counts_yield_zero() {
        let settings = WorleySettings {
            num_layers: -1,
            num_points: 8,
            ..Default::default()
        };
        assert_eq!(settings.total_point_count(), 0);

        let settings = WorleySettings {
            num_layers: 3,
            num_points: -8,
            ..Default::default()
        };
        assert_eq!(settings.total_point_count(), 0);
    }

    #[test]
    fn test_pack_encodes_invert_flag() {
        let record = WorleySettings::default().pack();
        assert_eq!(record.invert, 1);
        assert_eq!(record.num_points, 4);

        let record = WorleySettings {
            invert: false,
            ..Default::default()
        }
        .pack();
        assert_eq!(record.invert, 0);
    }
}
