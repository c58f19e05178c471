//! Headless host that records every call instead of touching a GPU.

use std::collections::HashMap;

use super::{unbind_buffer, BufferHandle, ComputeHost, VolumeHandle};
use crate::error::{NoiseError, NoiseResult};

/// One observed host call
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateVolume { side: u32 },
    ReleaseVolume { volume: VolumeHandle },
    CreateBuffer { label: String, stride: usize, len: usize },
    ReadBuffer { buffer: BufferHandle },
    ReleaseBuffer { buffer: BufferHandle },
    SetBuffer { name: String, buffer: BufferHandle },
    SetInt { name: String, value: i32 },
    SetVector { name: String, value: [f32; 4] },
    SetTexture { name: String, volume: VolumeHandle },
    Dispatch { groups: [u32; 3] },
}

#[derive(Debug)]
struct RecordedBuffer {
    stride: usize,
    data: Vec<u8>,
}

/// Call-recording `ComputeHost` with failure injection
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub calls: Vec<HostCall>,
    volumes: HashMap<u64, [u32; 3]>,
    buffers: HashMap<u64, RecordedBuffer>,
    bound: HashMap<String, BufferHandle>,
    next_id: u64,

    /// Fail every volume allocation
    pub fail_volume_allocation: bool,
    /// Fail buffer creation for this label
    pub fail_buffer_label: Option<String>,
    /// Fail the nth dispatch (0-based)
    pub fail_dispatch_at: Option<usize>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Dispatches issued so far
    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Dispatch { groups } => Some(*groups),
                _ => None,
            })
            .collect()
    }

    /// Volume allocations requested so far
    pub fn volume_allocations(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, HostCall::CreateVolume { .. }))
            .count()
    }

    /// Buffers created and not yet released
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers created so far, by label, with their element count
    pub fn created_buffers(&self) -> Vec<(String, usize)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::CreateBuffer { label, stride, len } => {
                    Some((label.clone(), if *stride == 0 { 0 } else { len / stride }))
                }
                _ => None,
            })
            .collect()
    }

    /// Simulate a lost or corrupted volume allocation
    pub fn corrupt_volume(&mut self, volume: VolumeHandle, extent: [u32; 3]) {
        self.volumes.insert(volume.0, extent);
    }

    /// Drop a volume behind the pipeline's back
    pub fn invalidate_volume(&mut self, volume: VolumeHandle) {
        self.volumes.remove(&volume.0);
    }

    /// Buffer currently bound under `name`
    pub fn bound_buffer(&self, name: &str) -> Option<BufferHandle> {
        self.bound.get(name).copied()
    }
}

impl ComputeHost for RecordingHost {
    fn create_volume(&mut self, side: u32) -> NoiseResult<VolumeHandle> {
        self.calls.push(HostCall::CreateVolume { side });
        if self.fail_volume_allocation {
            return Err(NoiseError::VolumeAllocation {
                side,
                reason: "injected failure".to_string(),
            });
        }
        let id = self.next_id();
        self.volumes.insert(id, [side; 3]);
        Ok(VolumeHandle(id))
    }

    fn volume_extent(&self, volume: VolumeHandle) -> Option<[u32; 3]> {
        self.volumes.get(&volume.0).copied()
    }

    fn release_volume(&mut self, volume: VolumeHandle) {
        self.calls.push(HostCall::ReleaseVolume { volume });
        self.volumes.remove(&volume.0);
    }

    fn create_buffer(
        &mut self,
        label: &str,
        stride: usize,
        data: &[u8],
    ) -> NoiseResult<BufferHandle> {
        self.calls.push(HostCall::CreateBuffer {
            label: label.to_string(),
            stride,
            len: data.len(),
        });
        if self.fail_buffer_label.as_deref() == Some(label) {
            return Err(NoiseError::BufferCreation {
                label: label.to_string(),
                size: data.len() as u64,
                reason: "injected failure".to_string(),
            });
        }
        let id = self.next_id();
        self.buffers.insert(
            id,
            RecordedBuffer {
                stride,
                data: data.to_vec(),
            },
        );
        Ok(BufferHandle(id))
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> NoiseResult<Vec<u8>> {
        self.calls.push(HostCall::ReadBuffer { buffer });
        self.buffers
            .get(&buffer.0)
            .map(|b| b.data.clone())
            .ok_or(NoiseError::UnknownHandle {
                kind: "buffer",
                id: buffer.0,
            })
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.calls.push(HostCall::ReleaseBuffer { buffer });
        if let Some(released) = self.buffers.remove(&buffer.0) {
            log::trace!(
                "Released buffer {} ({} elements)",
                buffer.0,
                released.data.len() / released.stride.max(1)
            );
        }
        unbind_buffer(&mut self.bound, buffer);
    }

    fn set_buffer(&mut self, _kernel: u32, name: &str, buffer: BufferHandle) {
        self.calls.push(HostCall::SetBuffer {
            name: name.to_string(),
            buffer,
        });
        self.bound.insert(name.to_string(), buffer);
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.calls.push(HostCall::SetInt {
            name: name.to_string(),
            value,
        });
    }

    fn set_vector(&mut self, name: &str, value: [f32; 4]) {
        self.calls.push(HostCall::SetVector {
            name: name.to_string(),
            value,
        });
    }

    fn set_texture(&mut self, _kernel: u32, name: &str, volume: VolumeHandle) {
        self.calls.push(HostCall::SetTexture {
            name: name.to_string(),
            volume,
        });
    }

    fn dispatch(&mut self, _kernel: u32, groups: [u32; 3]) -> NoiseResult<()> {
        let index = self.dispatches().len();
        self.calls.push(HostCall::Dispatch { groups });
        if self.fail_dispatch_at == Some(index) {
            return Err(NoiseError::Dispatch("injected failure".to_string()));
        }
        Ok(())
    }
}
