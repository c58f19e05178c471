//! Volume lifecycle: allocate lazily, recreate only on shape change.

use crate::dirty::{DirtyReason, DirtyTracker};
use crate::error::NoiseResult;
use crate::host::{ComputeHost, VolumeHandle};

/// One named volume owned across generation passes
#[derive(Debug)]
pub struct VolumeSlot {
    label: &'static str,
    handle: Option<VolumeHandle>,
}

impl VolumeSlot {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<VolumeHandle> {
        self.handle
    }

    /// Return a volume of `side`^3, reallocating only when needed
    ///
    /// A missing, invalid, or differently shaped volume is released and
    /// replaced, and `dirty` is marked. A matching volume is returned as is.
    pub fn ensure<H: ComputeHost>(
        &mut self,
        host: &mut H,
        side: u32,
        dirty: &mut DirtyTracker,
    ) -> NoiseResult<VolumeHandle> {
        if let Some(handle) = self.handle {
            match host.volume_extent(handle) {
                Some(extent) if extent == [side; 3] => return Ok(handle),
                Some(extent) => {
                    log::debug!(
                        "{} volume {:?} does not match requested side {}",
                        self.label,
                        extent,
                        side
                    );
                }
                None => log::warn!("{} volume is no longer valid, recreating", self.label),
            }
            self.handle = None;
            host.release_volume(handle);
        }

        let handle = host.create_volume(side)?;
        log::debug!("Allocated {} volume {}^3", self.label, side);
        self.handle = Some(handle);
        dirty.mark(DirtyReason::VolumeReallocated);
        Ok(handle)
    }

    /// Release the volume if one is held
    pub fn release<H: ComputeHost>(&mut self, host: &mut H) {
        if let Some(handle) = self.handle.take() {
            host.release_volume(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, RecordingHost};

    fn clean_tracker() -> DirtyTracker {
        let mut tracker = DirtyTracker::new();
        tracker.take();
        tracker
    }

    #[test]
    fn test_same_side_reuses_volume() {
        let mut host = RecordingHost::new();
        let mut slot = VolumeSlot::new("base");
        let mut dirty = clean_tracker();

        let first = slot.ensure(&mut host, 32, &mut dirty).unwrap();
        assert!(dirty.is_dirty());
        dirty.take();

        let second = slot.ensure(&mut host, 32, &mut dirty).unwrap();
        assert_eq!(first, second);
        assert!(!dirty.is_dirty());
        assert_eq!(host.volume_allocations(), 1);
    }

    #[test]
    fn test_different_side_reallocates() {
        let mut host = RecordingHost::new();
        let mut slot = VolumeSlot::new("detail");
        let mut dirty = clean_tracker();

        let first = slot.ensure(&mut host, 32, &mut dirty).unwrap();
        dirty.take();

        let second = slot.ensure(&mut host, 64, &mut dirty).unwrap();
        assert_ne!(first, second);
        assert_eq!(dirty.reason(), Some(DirtyReason::VolumeReallocated));
        assert!(host
            .calls
            .contains(&HostCall::ReleaseVolume { volume: first }));
        assert_eq!(host.volume_extent(second), Some([64, 64, 64]));
    }

    #[test]
    fn test_partial_extent_reallocates() {
        let mut host = RecordingHost::new();
        let mut slot = VolumeSlot::new("base");
        let mut dirty = clean_tracker();

        let first = slot.ensure(&mut host, 16, &mut dirty).unwrap();
        dirty.take();
        host.corrupt_volume(first, [16, 16, 8]);

        let second = slot.ensure(&mut host, 16, &mut dirty).unwrap();
        assert_ne!(first, second);
        assert!(dirty.is_dirty());
    }

    #[test]
    fn test_invalid_volume_reallocates() {
        let mut host = RecordingHost::new();
        let mut slot = VolumeSlot::new("base");
        let mut dirty = clean_tracker();

        let first = slot.ensure(&mut host, 16, &mut dirty).unwrap();
        dirty.take();
        host.invalidate_volume(first);

        slot.ensure(&mut host, 16, &mut dirty).unwrap();
        assert!(dirty.is_dirty());
        assert_eq!(host.volume_allocations(), 2);
    }

    #[test]
    fn test_failed_allocation_leaves_slot_empty() {
        let mut host = RecordingHost::new();
        host.fail_volume_allocation = true;
        let mut slot = VolumeSlot::new("base");
        let mut dirty = clean_tracker();

        assert!(slot.ensure(&mut host, 16, &mut dirty).is_err());
        assert_eq!(slot.handle(), None);
        assert!(!dirty.is_dirty());
    }
}
