//! Regeneration gate owned by one pipeline instance.

/// Why the volumes need regenerating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyReason {
    /// Nothing generated yet
    Initial,
    /// A volume was (re)allocated and holds no noise
    VolumeReallocated,
    /// Parameters were edited by the caller
    ParametersChanged,
}

#[derive(Debug)]
pub struct DirtyTracker {
    reason: Option<DirtyReason>,
}

impl DirtyTracker {
    /// New trackers start dirty
    pub fn new() -> Self {
        Self {
            reason: Some(DirtyReason::Initial),
        }
    }

    pub fn mark(&mut self, reason: DirtyReason) {
        log::debug!("Noise marked dirty: {:?}", reason);
        // Keep the first reason until the next pass
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
    }

    /// Clear the flag, returning the reason it was set
    pub fn take(&mut self) -> Option<DirtyReason> {
        self.reason.take()
    }

    pub fn is_dirty(&self) -> bool {
        self.reason.is_some()
    }

    pub fn reason(&self) -> Option<DirtyReason> {
        self.reason
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}
