//! Compute host seam: volumes, transient buffers, named bindings, dispatch.
//!
//! The pipeline never talks to a GPU API directly. `WgpuHost` runs the
//! kernel on a real device; `RecordingHost` logs calls for tests and dry runs.

mod recording;
mod wgpu_host;

pub use recording::{HostCall, RecordingHost};
pub use wgpu_host::{WgpuHost, VOLUME_FORMAT};

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::NoiseResult;

/// Index of the noise kernel (the shader has a single entry point)
pub const NOISE_KERNEL: u32 = 0;

/// Threads per dispatch group along each axis
///
/// Must equal `@workgroup_size` in `noise.wgsl`.
pub const THREAD_GROUP_SIZE: u32 = 8;

/// Binding names shared with the kernel
pub mod bindings {
    pub const TEST_PARAMS: &str = "testParams";
    pub const RESOLUTION: &str = "resolution";
    pub const RESULT: &str = "Result";
    pub const SIMPLEX_SETTINGS: &str = "simplexSettingsBuffer";
    pub const SIMPLEX_OFFSETS: &str = "simplexOffsets";
    pub const WORLEY_SETTINGS: &str = "worleySettingsBuffer";
    pub const POINTS: &str = "points";
    pub const TEST_BUFFER: &str = "testBuffer";
}

/// Opaque handle to a host-owned 3D volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeHandle(pub u64);

/// Opaque handle to a host-owned transient buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// External GPU collaborator driven by the noise pipeline
pub trait ComputeHost {
    /// Allocate a cubic volume with storage-write access and wrap sampling
    fn create_volume(&mut self, side: u32) -> NoiseResult<VolumeHandle>;

    /// `[width, height, depth]` of a live volume, `None` if invalid
    fn volume_extent(&self, volume: VolumeHandle) -> Option<[u32; 3]>;

    fn release_volume(&mut self, volume: VolumeHandle);

    /// Create a buffer of `data.len() / stride` elements and upload `data`
    fn create_buffer(&mut self, label: &str, stride: usize, data: &[u8])
        -> NoiseResult<BufferHandle>;

    /// Blocking readback; waits for all previously issued dispatches
    fn read_buffer(&mut self, buffer: BufferHandle) -> NoiseResult<Vec<u8>>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn set_buffer(&mut self, kernel: u32, name: &str, buffer: BufferHandle);

    fn set_int(&mut self, name: &str, value: i32);

    fn set_vector(&mut self, name: &str, value: [f32; 4]);

    fn set_texture(&mut self, kernel: u32, name: &str, volume: VolumeHandle);

    /// Issue `groups[0] x groups[1] x groups[2]` thread groups
    fn dispatch(&mut self, kernel: u32, groups: [u32; 3]) -> NoiseResult<()>;
}

/// Thread groups needed to cover `resolution` texels along one axis
pub fn group_count(resolution: u32) -> u32 {
    resolution.div_ceil(THREAD_GROUP_SIZE)
}

/// Drop every named binding that still points at a released buffer
pub(crate) fn unbind_buffer<K: Eq + Hash>(
    bindings: &mut HashMap<K, BufferHandle>,
    buffer: BufferHandle,
) {
    bindings.retain(|_, bound| *bound != buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbind_buffer_clears_every_name() {
        let mut bindings = HashMap::new();
        bindings.insert("points", BufferHandle(1));
        bindings.insert("simplexOffsets", BufferHandle(1));
        bindings.insert("testBuffer", BufferHandle(2));

        unbind_buffer(&mut bindings, BufferHandle(1));
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("testBuffer"), Some(&BufferHandle(2)));
    }

    #[test]
    fn test_group_count_rounds_up() {
        assert_eq!(group_count(128), 16);
        assert_eq!(group_count(32), 4);
        assert_eq!(group_count(33), 5);
        assert_eq!(group_count(1), 1);
        assert_eq!(group_count(0), 0);
    }

    #[test]
    fn test_shader_workgroup_size_matches() {
        let source = include_str!("noise.wgsl");
        let declared = format!(
            "@workgroup_size({0}, {0}, {0})",
            THREAD_GROUP_SIZE
        );
        assert!(
            source.contains(&declared),
            "noise.wgsl must declare {}",
            declared
        );
    }

    #[test]
    fn test_shader_layer_walk_uses_running_product() {
        let source = include_str!("noise.wgsl");
        let worley = &source[source.find("fn worley_fbm").unwrap()..];
        assert!(worley.contains("frequency *= settings.lacunarity"));
        assert!(!worley.contains("pow(settings.lacunarity"));
    }

    #[test]
    fn test_shader_simplex_is_tiled() {
        let source = include_str!("noise.wgsl");
        let simplex = &source[source.find("fn simplex_fbm").unwrap()..];
        let body = &simplex[..simplex.find("fn point_at").unwrap()];
        assert!(body.contains("tiled_snoise("));
    }
}
