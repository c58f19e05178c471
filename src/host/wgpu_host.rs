//! `ComputeHost` on a headless wgpu device.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use super::{
    bindings, unbind_buffer, BufferHandle, ComputeHost, VolumeHandle, NOISE_KERNEL,
    THREAD_GROUP_SIZE,
};
use crate::error::{NoiseError, NoiseResult};

/// Texel format of both noise volumes
pub const VOLUME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Storage bindings cannot be empty; smaller buffers are padded to this size
const MIN_BUFFER_SIZE: u64 = 16;

const WORKGROUP_INVOCATIONS: u32 = THREAD_GROUP_SIZE * THREAD_GROUP_SIZE * THREAD_GROUP_SIZE;

/// Buffer names and their binding slots in `noise.wgsl`
const BUFFER_BINDINGS: [(&str, u32, bool); 5] = [
    (bindings::SIMPLEX_SETTINGS, 2, true),
    (bindings::SIMPLEX_OFFSETS, 3, true),
    (bindings::WORLEY_SETTINGS, 4, true),
    (bindings::POINTS, 5, true),
    (bindings::TEST_BUFFER, 6, false),
];

/// Uniform block holding the scalar/vector bindings
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct KernelUniforms {
    test_params: [f32; 4],
    resolution: i32,
    _padding: [i32; 3],
}

struct GpuVolume {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Unpadded byte length
    len: u64,
}

/// wgpu device, noise kernel and the resources it binds
pub struct WgpuHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    volumes: HashMap<u64, GpuVolume>,
    buffers: HashMap<u64, GpuBuffer>,
    bound_buffers: HashMap<&'static str, BufferHandle>,
    bound_volume: Option<VolumeHandle>,
    uniforms: KernelUniforms,
    next_id: u64,
}

impl WgpuHost {
    /// Request a headless device and build the noise kernel
    pub async fn new() -> NoiseResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(NoiseError::DeviceNotFound)?;

        let supported = adapter.limits().max_compute_invocations_per_workgroup;
        if supported < WORKGROUP_INVOCATIONS {
            return Err(NoiseError::DeviceRequest(format!(
                "adapter supports {} invocations per workgroup, kernel needs {}",
                supported, WORKGROUP_INVOCATIONS
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Cloud Noise Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_compute_invocations_per_workgroup: WORKGROUP_INVOCATIONS,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| NoiseError::DeviceRequest(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            log::error!("Uncaptured wgpu error: {}", e);
        }));

        let info = adapter.get_info();
        log::info!("Cloud noise device: {} ({:?})", info.name, info.backend);

        Ok(Self::with_device(device, queue))
    }

    /// Blocking wrapper around `new`
    pub fn new_blocking() -> NoiseResult<Self> {
        pollster::block_on(Self::new())
    }

    /// Build the kernel on an existing device
    pub fn with_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cloud Noise Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("noise.wgsl").into()),
        });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: VOLUME_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D3,
                },
                count: None,
            },
        ];
        for (_, binding, read_only) in BUFFER_BINDINGS {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloud Noise Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cloud Noise Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cloud Noise Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloud Noise Uniforms"),
            size: std::mem::size_of::<KernelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Readers sample the volumes tiled
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cloud Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
            volumes: HashMap::new(),
            buffers: HashMap::new(),
            bound_buffers: HashMap::new(),
            bound_volume: None,
            uniforms: KernelUniforms::zeroed(),
            next_id: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Wrap-addressed sampler for reading the volumes
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// View of a volume for binding in a downstream shader
    pub fn volume_view(&self, volume: VolumeHandle) -> Option<&wgpu::TextureView> {
        self.volumes.get(&volume.0).map(|v| &v.view)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_scope(&self) -> Option<wgpu::Error> {
        pollster::block_on(self.device.pop_error_scope())
    }

    /// Map a staging buffer and copy its contents out
    fn map_staging(&self, staging: &wgpu::Buffer) -> NoiseResult<Vec<u8>> {
        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        pollster::block_on(receiver)
            .map_err(|e| NoiseError::Readback(e.to_string()))?
            .map_err(|e| NoiseError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Read one z-slice of a volume as tightly packed RGBA8 rows
    pub fn read_volume_slice(&self, volume: VolumeHandle, z: u32) -> NoiseResult<Vec<u8>> {
        let texture = &self
            .volumes
            .get(&volume.0)
            .ok_or(NoiseError::UnknownHandle {
                kind: "volume",
                id: volume.0,
            })?
            .texture;
        let size = texture.size();
        if z >= size.depth_or_array_layers {
            return Err(NoiseError::Readback(format!(
                "slice {} outside volume depth {}",
                z, size.depth_or_array_layers
            )));
        }

        let bytes_per_pixel = 4;
        let unpadded_bytes_per_row = size.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloud Noise Slice Readback"),
            size: (padded_bytes_per_row * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cloud Noise Slice Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded = self.map_staging(&staging)?;

        // Remove padding
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * size.height) as usize);
        for row in padded.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        Ok(pixels)
    }
}

impl ComputeHost for WgpuHost {
    fn create_volume(&mut self, side: u32) -> NoiseResult<VolumeHandle> {
        let max_side = self.device.limits().max_texture_dimension_3d;
        if side == 0 || side > max_side {
            return Err(NoiseError::VolumeAllocation {
                side,
                reason: format!("side must be in 1..={}", max_side),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Cloud Noise Volume"),
            size: wgpu::Extent3d {
                width: side,
                height: side,
                depth_or_array_layers: side,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: VOLUME_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        if let Some(error) = self.check_scope() {
            return Err(NoiseError::VolumeAllocation {
                side,
                reason: error.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_id();
        self.volumes.insert(id, GpuVolume { texture, view });
        Ok(VolumeHandle(id))
    }

    fn volume_extent(&self, volume: VolumeHandle) -> Option<[u32; 3]> {
        self.volumes.get(&volume.0).map(|v| {
            let size = v.texture.size();
            [size.width, size.height, size.depth_or_array_layers]
        })
    }

    fn release_volume(&mut self, volume: VolumeHandle) {
        if self.bound_volume == Some(volume) {
            self.bound_volume = None;
        }
        // Dropping defers destruction until pending work is done
        self.volumes.remove(&volume.0);
    }

    fn create_buffer(
        &mut self,
        label: &str,
        stride: usize,
        data: &[u8],
    ) -> NoiseResult<BufferHandle> {
        let len = data.len() as u64;
        let size = wgpu::util::align_to(len.max(MIN_BUFFER_SIZE), wgpu::COPY_BUFFER_ALIGNMENT);
        log::trace!(
            "Creating buffer '{}': {} elements of {} bytes",
            label,
            data.len() / stride.max(1),
            stride
        );

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(error) = self.check_scope() {
            return Err(NoiseError::BufferCreation {
                label: label.to_string(),
                size,
                reason: error.to_string(),
            });
        }

        if !data.is_empty() {
            self.queue.write_buffer(&buffer, 0, data);
        }

        let id = self.next_id();
        self.buffers.insert(id, GpuBuffer { buffer, len });
        Ok(BufferHandle(id))
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> NoiseResult<Vec<u8>> {
        let source = self.buffers.get(&buffer.0).ok_or(NoiseError::UnknownHandle {
            kind: "buffer",
            id: buffer.0,
        })?;
        if source.len == 0 {
            return Ok(Vec::new());
        }
        let copy_size = wgpu::util::align_to(source.len, wgpu::COPY_BUFFER_ALIGNMENT);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloud Noise Readback"),
            size: copy_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cloud Noise Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&source.buffer, 0, &staging, 0, copy_size);
        self.queue.submit(Some(encoder.finish()));

        let mut data = self.map_staging(&staging)?;
        data.truncate(source.len as usize);
        Ok(data)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        unbind_buffer(&mut self.bound_buffers, buffer);
    }

    fn set_buffer(&mut self, kernel: u32, name: &str, buffer: BufferHandle) {
        debug_assert_eq!(kernel, NOISE_KERNEL);
        match BUFFER_BINDINGS.iter().find(|(binding, _, _)| *binding == name) {
            Some((binding, _, _)) => {
                self.bound_buffers.insert(*binding, buffer);
            }
            None => log::warn!("Kernel has no buffer named '{}'", name),
        }
    }

    fn set_int(&mut self, name: &str, value: i32) {
        match name {
            bindings::RESOLUTION => self.uniforms.resolution = value,
            _ => log::warn!("Kernel has no int uniform named '{}'", name),
        }
    }

    fn set_vector(&mut self, name: &str, value: [f32; 4]) {
        match name {
            bindings::TEST_PARAMS => self.uniforms.test_params = value,
            _ => log::warn!("Kernel has no vector uniform named '{}'", name),
        }
    }

    fn set_texture(&mut self, kernel: u32, name: &str, volume: VolumeHandle) {
        debug_assert_eq!(kernel, NOISE_KERNEL);
        match name {
            bindings::RESULT => self.bound_volume = Some(volume),
            _ => log::warn!("Kernel has no texture named '{}'", name),
        }
    }

    fn dispatch(&mut self, kernel: u32, groups: [u32; 3]) -> NoiseResult<()> {
        if kernel != NOISE_KERNEL {
            return Err(NoiseError::Dispatch(format!("unknown kernel {}", kernel)));
        }

        let volume = self
            .bound_volume
            .ok_or_else(|| NoiseError::Dispatch(format!("'{}' not bound", bindings::RESULT)))?;
        let view = &self
            .volumes
            .get(&volume.0)
            .ok_or(NoiseError::UnknownHandle {
                kind: "volume",
                id: volume.0,
            })?
            .view;

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(view),
            },
        ];
        for (name, binding, _) in BUFFER_BINDINGS {
            let handle = self
                .bound_buffers
                .get(name)
                .ok_or_else(|| NoiseError::Dispatch(format!("buffer '{}' not bound", name)))?;
            let buffer = self.buffers.get(&handle.0).ok_or(NoiseError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: buffer.buffer.as_entire_binding(),
            });
        }

        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloud Noise Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cloud Noise Encoder"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Cloud Noise Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(error) = self.check_scope() {
            return Err(NoiseError::Dispatch(error.to_string()));
        }
        Ok(())
    }
}
