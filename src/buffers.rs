//! Per-pass transient buffers, released when the scope drops.

use std::mem::size_of;

use bytemuck::Pod;

use crate::error::NoiseResult;
use crate::host::{BufferHandle, ComputeHost};

/// Owns every buffer created during one generation pass
///
/// Buffers are released on drop, so early returns through `?` never leak.
pub struct BufferScope<'h, H: ComputeHost> {
    host: &'h mut H,
    buffers: Vec<BufferHandle>,
}

impl<'h, H: ComputeHost> BufferScope<'h, H> {
    pub fn new(host: &'h mut H) -> Self {
        Self {
            host,
            buffers: Vec::new(),
        }
    }

    /// Host access for uniforms, textures and dispatch
    pub fn host(&mut self) -> &mut H {
        &mut *self.host
    }

    /// Upload `data` with stride `size_of::<T>()` and bind it as `name`
    pub fn upload<T: Pod>(
        &mut self,
        kernel: u32,
        name: &str,
        data: &[T],
    ) -> NoiseResult<BufferHandle> {
        let handle = self
            .host
            .create_buffer(name, size_of::<T>(), bytemuck::cast_slice(data))?;
        self.buffers.push(handle);
        self.host.set_buffer(kernel, name, handle);
        Ok(handle)
    }

    /// Buffers currently owned by this scope
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<H: ComputeHost> Drop for BufferScope<'_, H> {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.host.release_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoiseError;
    use crate::host::{HostCall, RecordingHost};

    #[test]
    fn test_upload_binds_by_name() {
        let mut host = RecordingHost::new();
        {
            let mut scope = BufferScope::new(&mut host);
            let handle = scope.upload(0, "points", &[[0.5f32; 3]; 4]).unwrap();
            assert_eq!(scope.len(), 1);
            assert!(scope.host().calls.contains(&HostCall::SetBuffer {
                name: "points".to_string(),
                buffer: handle,
            }));
        }
        assert_eq!(host.live_buffers(), 0);
        assert_eq!(host.created_buffers(), vec![("points".to_string(), 4)]);
    }

    #[test]
    fn test_release_on_error_path() {
        fn failing_pass(host: &mut RecordingHost) -> Result<(), NoiseError> {
            let mut scope = BufferScope::new(host);
            scope.upload(0, "testBuffer", &[0i32; 8])?;
            scope.upload(0, "points", &[[0.0f32; 3]; 2])?;
            Ok(())
        }

        let mut host = RecordingHost::new();
        host.fail_buffer_label = Some("points".to_string());
        assert!(failing_pass(&mut host).is_err());
        assert_eq!(host.live_buffers(), 0);
    }

    #[test]
    fn test_empty_upload_is_allowed() {
        let mut host = RecordingHost::new();
        let mut scope = BufferScope::new(&mut host);
        let empty: [[f32; 3]; 0] = [];
        assert!(scope.upload(0, "simplexOffsets", &empty).is_ok());
    }
}
