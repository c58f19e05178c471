//! Deterministic scatter data for the noise kernels.
//!
//! Every family owns a seeded stream. The same seed always yields the same
//! sequence within one build of this crate; cross-platform bit equality is
//! not promised.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scale applied to simplex layer offsets
pub const DEFAULT_OFFSET_SCALE: f32 = 1000.0;

/// Seeded uniform sample stream
pub struct FieldSampler {
    rng: StdRng,
}

impl FieldSampler {
    /// Create a stream for `seed`
    pub fn new(seed: i32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed as i64 as u64),
        }
    }

    /// Next sample in [0, 1)
    pub fn next_unit(&mut self) -> f32 {
        // Sample in f64 and narrow; clamp guards the rounding case at 1.0
        let value = self.rng.gen::<f64>() as f32;
        value.min(1.0 - f32::EPSILON / 2.0)
    }

    /// `count` points in the unit cube, three consecutive samples each
    pub fn points(&mut self, count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                let x = self.next_unit();
                let y = self.next_unit();
                let z = self.next_unit();
                Vec3::new(x, y, z)
            })
            .collect()
    }

    /// `count` offsets with components uniform in [-scale, scale]
    pub fn offsets(&mut self, count: usize, scale: f32) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                let x = self.next_unit() * 2.0 - 1.0;
                let y = self.next_unit() * 2.0 - 1.0;
                let z = self.next_unit() * 2.0 - 1.0;
                Vec3::new(x, y, z) * scale
            })
            .collect()
    }
}

/// Scatter points for a Worley family; negative counts produce nothing
pub fn generate_points(seed: i32, total_count: i64) -> Vec<Vec3> {
    let count = usize::try_from(total_count).unwrap_or(0);
    FieldSampler::new(seed).points(count)
}

/// Layer offsets for the simplex family; negative counts produce nothing
pub fn generate_offsets(seed: i32, count: i64, scale: f32) -> Vec<Vec3> {
    let count = usize::try_from(count).unwrap_or(0);
    FieldSampler::new(seed).offsets(count, scale)
}

/// Flatten vectors into the tightly packed stride-12 upload layout
pub fn pack_vec3(vectors: &[Vec3]) -> Vec<[f32; 3]> {
    vectors.iter().map(|v| v.to_array()).collect()
}
