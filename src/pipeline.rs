//! Base and detail cloud noise generation.
//!
//! One pass uploads the simplex offsets and both Worley point sets, then
//! dispatches the noise kernel over the base volume (optional) and the
//! detail volume. Passes only run while the dirty tracker is set.

use std::time::{Duration, Instant};

use crate::buffers::BufferScope;
use crate::dirty::{DirtyReason, DirtyTracker};
use crate::error::NoiseResult;
use crate::host::{bindings, group_count, ComputeHost, VolumeHandle, NOISE_KERNEL};
use crate::params::{layout, CloudNoiseConfig, SimplexSettings, WorleySettings};
use crate::sampler::{self, FieldSampler, DEFAULT_OFFSET_SCALE};
use crate::volume::VolumeSlot;

/// Wall-clock split of a timed pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassTiming {
    /// CPU-side generation and upload before the first dispatch
    pub upload: Duration,
    /// From the first dispatch until the blocking readback returned
    pub gpu: Duration,
}

impl PassTiming {
    pub fn total(&self) -> Duration {
        self.upload + self.gpu
    }
}

/// Summary of a pass that did run
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub reason: DirtyReason,
    /// Thread groups per axis for the base volume
    pub base_groups: u32,
    /// Thread groups per axis for the detail volume
    pub detail_groups: u32,
    pub base_dispatched: bool,
    pub timing: Option<PassTiming>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    /// Nothing changed since the last pass
    Skipped,
    Generated(PassReport),
}

/// Owns the noise volumes and regenerates them on demand
pub struct NoisePipeline<H: ComputeHost> {
    host: H,
    base: VolumeSlot,
    detail: VolumeSlot,
    dirty: DirtyTracker,
}

impl<H: ComputeHost> NoisePipeline<H> {
    /// Create a pipeline over `host`
    ///
    /// Fails if the packed record layouts disagree with their documented
    /// offsets.
    pub fn new(host: H) -> NoiseResult<Self> {
        layout::verify_all()?;
        Ok(Self {
            host,
            base: VolumeSlot::new("base"),
            detail: VolumeSlot::new("detail"),
            dirty: DirtyTracker::new(),
        })
    }

    /// Request regeneration on the next `generate` call
    pub fn mark_dirty(&mut self) {
        self.dirty.mark(DirtyReason::ParametersChanged);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Mark dirty and generate immediately
    pub fn manual_update(&mut self, config: &CloudNoiseConfig) -> NoiseResult<GenerateOutcome> {
        self.mark_dirty();
        self.generate(config)
    }

    /// Run a generation pass if anything changed
    ///
    /// The dirty flag is cleared before any GPU work, so a failed pass is
    /// not retried until the caller marks the pipeline dirty again.
    pub fn generate(&mut self, config: &CloudNoiseConfig) -> NoiseResult<GenerateOutcome> {
        config.validate()?;

        let base_side = config.base_side();
        let detail_side = config.detail_side();
        let base_volume = self.base.ensure(&mut self.host, base_side, &mut self.dirty)?;
        let detail_volume = self
            .detail
            .ensure(&mut self.host, detail_side, &mut self.dirty)?;

        let Some(reason) = self.dirty.take() else {
            log::debug!("Cloud noise up to date");
            return Ok(GenerateOutcome::Skipped);
        };
        log::debug!("Generating cloud noise ({:?})", reason);

        let upload_timer = Instant::now();

        let base_groups = group_count(base_side);
        let detail_groups = group_count(detail_side);

        let mut scope = BufferScope::new(&mut self.host);
        scope
            .host()
            .set_vector(bindings::TEST_PARAMS, config.test_params);
        scope
            .host()
            .set_texture(NOISE_KERNEL, bindings::RESULT, base_volume);
        let test_buffer = scope.upload(
            NOISE_KERNEL,
            bindings::TEST_BUFFER,
            &vec![0i32; base_groups as usize],
        )?;

        upload_simplex(&mut scope, &config.simplex, config.base_resolution)?;
        upload_worley(&mut scope, &config.worley)?;

        let upload = upload_timer.elapsed();
        let gpu_timer = Instant::now();

        if config.update_base_noise {
            scope
                .host()
                .dispatch(NOISE_KERNEL, [base_groups, base_groups, base_groups])?;
        }

        upload_worley(&mut scope, &config.detail_worley)?;
        scope
            .host()
            .set_int(bindings::RESOLUTION, config.detail_resolution);
        scope
            .host()
            .set_texture(NOISE_KERNEL, bindings::RESULT, detail_volume);
        scope
            .host()
            .dispatch(NOISE_KERNEL, [detail_groups, detail_groups, detail_groups])?;

        let timing = if config.log_compute_time {
            // Readback blocks until every dispatch above has retired
            let scratch = scope.host().read_buffer(test_buffer)?;
            log::trace!(
                "Scratch readback: {} groups",
                scratch.len() / layout::SCRATCH_STRIDE
            );
            let timing = PassTiming {
                upload,
                gpu: gpu_timer.elapsed(),
            };
            log::info!(
                "Cloud noise: {}ms (CPU: {}ms GPU: {}ms)",
                timing.total().as_millis(),
                timing.upload.as_millis(),
                timing.gpu.as_millis()
            );
            Some(timing)
        } else {
            None
        };

        Ok(GenerateOutcome::Generated(PassReport {
            reason,
            base_groups,
            detail_groups,
            base_dispatched: config.update_base_noise,
            timing,
        }))
    }

    /// Base volume for downstream readers
    pub fn base_volume(&self) -> Option<VolumeHandle> {
        self.base.handle()
    }

    /// Detail volume for downstream readers
    pub fn detail_volume(&self) -> Option<VolumeHandle> {
        self.detail.handle()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Release both volumes; the next pass reallocates them
    pub fn release_volumes(&mut self) {
        self.base.release(&mut self.host);
        self.detail.release(&mut self.host);
        self.dirty.mark(DirtyReason::VolumeReallocated);
    }
}

fn upload_simplex<H: ComputeHost>(
    scope: &mut BufferScope<'_, H>,
    settings: &SimplexSettings,
    resolution: i32,
) -> NoiseResult<()> {
    let offsets = FieldSampler::new(settings.seed)
        .offsets(settings.offset_count(), DEFAULT_OFFSET_SCALE);

    scope.upload(NOISE_KERNEL, bindings::SIMPLEX_SETTINGS, &[settings.pack()])?;
    scope.upload(
        NOISE_KERNEL,
        bindings::SIMPLEX_OFFSETS,
        &sampler::pack_vec3(&offsets),
    )?;
    scope.host().set_int(bindings::RESOLUTION, resolution);
    Ok(())
}

fn upload_worley<H: ComputeHost>(
    scope: &mut BufferScope<'_, H>,
    settings: &WorleySettings,
) -> NoiseResult<()> {
    let points = FieldSampler::new(settings.seed).points(settings.total_point_count());

    scope.upload(NOISE_KERNEL, bindings::POINTS, &sampler::pack_vec3(&points))?;
    scope.upload(NOISE_KERNEL, bindings::WORLEY_SETTINGS, &[settings.pack()])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, RecordingHost};

    fn pipeline() -> NoisePipeline<RecordingHost> {
        NoisePipeline::new(RecordingHost::new()).unwrap()
    }

    fn expect_report(outcome: GenerateOutcome) -> PassReport {
        match outcome {
            GenerateOutcome::Generated(report) => report,
            GenerateOutcome::Skipped => panic!("expected a generation pass"),
        }
    }

    #[test]
    fn test_dispatch_geometry() {
        let mut pipeline = pipeline();
        let report = expect_report(pipeline.generate(&CloudNoiseConfig::default()).unwrap());

        assert_eq!(report.base_groups, 16);
        assert_eq!(report.detail_groups, 4);
        assert_eq!(report.reason, DirtyReason::Initial);
        assert_eq!(
            pipeline.host().dispatches(),
            vec![[16, 16, 16], [4, 4, 4]]
        );
    }

    #[test]
    fn test_second_generate_is_noop() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig::default();

        assert!(matches!(
            pipeline.generate(&config).unwrap(),
            GenerateOutcome::Generated(_)
        ));
        assert_eq!(
            pipeline.generate(&config).unwrap(),
            GenerateOutcome::Skipped
        );

        assert_eq!(pipeline.host().dispatches().len(), 2);
        assert_eq!(pipeline.host().volume_allocations(), 2);
    }

    #[test]
    fn test_zero_resolution_rejected_before_allocation() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig {
            base_resolution: 0,
            ..Default::default()
        };

        let err = pipeline.generate(&config).unwrap_err();
        assert!(err.is_config_error());
        assert!(pipeline.host().calls.is_empty());
        assert!(pipeline.is_dirty());
    }

    #[test]
    fn test_buffers_released_after_pass() {
        let mut pipeline = pipeline();
        pipeline.generate(&CloudNoiseConfig::default()).unwrap();

        assert_eq!(pipeline.host().live_buffers(), 0);
        for name in ["testBuffer", "simplexOffsets", "points", "worleySettingsBuffer"] {
            assert_eq!(pipeline.host().bound_buffer(name), None, "{} still bound", name);
        }
        assert_eq!(
            pipeline.host().created_buffers(),
            vec![
                ("testBuffer".to_string(), 16),
                ("simplexSettingsBuffer".to_string(), 1),
                ("simplexOffsets".to_string(), 6),
                ("points".to_string(), 4 + 12 + 36),
                ("worleySettingsBuffer".to_string(), 1),
                ("points".to_string(), 10 + 20 + 40),
                ("worleySettingsBuffer".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_resolution_uniform_follows_target() {
        let mut pipeline = pipeline();
        pipeline.generate(&CloudNoiseConfig::default()).unwrap();

        let mut resolution = None;
        let mut target = None;
        let mut seen = Vec::new();
        for call in &pipeline.host().calls {
            match call {
                HostCall::SetInt { name, value } if name == "resolution" => {
                    resolution = Some(*value)
                }
                HostCall::SetTexture { volume, .. } => target = Some(*volume),
                HostCall::Dispatch { .. } => seen.push((resolution, target)),
                _ => {}
            }
        }

        assert_eq!(
            seen,
            vec![
                (Some(128), pipeline.base_volume()),
                (Some(32), pipeline.detail_volume()),
            ]
        );
    }

    #[test]
    fn test_skip_base_dispatch() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig {
            update_base_noise: false,
            ..Default::default()
        };

        let report = expect_report(pipeline.generate(&config).unwrap());
        assert!(!report.base_dispatched);
        assert_eq!(pipeline.host().dispatches(), vec![[4, 4, 4]]);
    }

    #[test]
    fn test_mark_dirty_regenerates() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig::default();
        pipeline.generate(&config).unwrap();

        pipeline.mark_dirty();
        let report = expect_report(pipeline.generate(&config).unwrap());
        assert_eq!(report.reason, DirtyReason::ParametersChanged);
        assert_eq!(pipeline.host().dispatches().len(), 4);
        assert_eq!(pipeline.host().volume_allocations(), 2);
    }

    #[test]
    fn test_manual_update_always_runs() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig::default();
        pipeline.generate(&config).unwrap();

        assert!(matches!(
            pipeline.manual_update(&config).unwrap(),
            GenerateOutcome::Generated(_)
        ));
    }

    #[test]
    fn test_resolution_change_regenerates() {
        let mut pipeline = pipeline();
        let mut config = CloudNoiseConfig::default();
        pipeline.generate(&config).unwrap();
        let old_detail = pipeline.detail_volume();

        config.detail_resolution = 64;
        let report = expect_report(pipeline.generate(&config).unwrap());
        assert_eq!(report.reason, DirtyReason::VolumeReallocated);
        assert_eq!(report.detail_groups, 8);
        assert_ne!(pipeline.detail_volume(), old_detail);
        assert_eq!(pipeline.host().volume_allocations(), 3);
    }

    #[test]
    fn test_failed_pass_releases_buffers_and_stays_clean() {
        let mut host = RecordingHost::new();
        host.fail_dispatch_at = Some(1);
        let mut pipeline = NoisePipeline::new(host).unwrap();
        let config = CloudNoiseConfig::default();

        assert!(pipeline.generate(&config).is_err());
        assert_eq!(pipeline.host().live_buffers(), 0);
        assert!(!pipeline.is_dirty());
        assert_eq!(
            pipeline.generate(&config).unwrap(),
            GenerateOutcome::Skipped
        );
    }

    #[test]
    fn test_failed_buffer_creation_releases_earlier_buffers() {
        let mut host = RecordingHost::new();
        host.fail_buffer_label = Some("worleySettingsBuffer".to_string());
        let mut pipeline = NoisePipeline::new(host).unwrap();

        assert!(pipeline.generate(&CloudNoiseConfig::default()).is_err());
        assert_eq!(pipeline.host().live_buffers(), 0);
        assert!(pipeline.host().dispatches().is_empty());
    }

    #[test]
    fn test_timing_reads_back_scratch_buffer() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig {
            log_compute_time: true,
            ..Default::default()
        };

        let report = expect_report(pipeline.generate(&config).unwrap());
        let timing = report.timing.unwrap();
        assert_eq!(timing.total(), timing.upload + timing.gpu);

        let calls = &pipeline.host().calls;
        let read = calls
            .iter()
            .position(|c| matches!(c, HostCall::ReadBuffer { .. }))
            .unwrap();
        let last_dispatch = calls
            .iter()
            .rposition(|c| matches!(c, HostCall::Dispatch { .. }))
            .unwrap();
        assert!(read > last_dispatch);
    }

    #[test]
    fn test_no_readback_without_timing() {
        let mut pipeline = pipeline();
        let report = expect_report(pipeline.generate(&CloudNoiseConfig::default()).unwrap());
        assert!(report.timing.is_none());
        assert!(!pipeline
            .host()
            .calls
            .iter()
            .any(|c| matches!(c, HostCall::ReadBuffer { .. })));
    }

    #[test]
    fn test_zero_layers_upload_empty_buffers() {
        let mut pipeline = pipeline();
        let mut config = CloudNoiseConfig::default();
        config.simplex.num_layers = 0;
        config.worley.num_layers = 0;

        pipeline.generate(&config).unwrap();
        let created = pipeline.host().created_buffers();
        assert!(created.contains(&("simplexOffsets".to_string(), 0)));
        assert!(created.contains(&("points".to_string(), 0)));
        assert_eq!(pipeline.host().dispatches().len(), 2);
    }

    #[test]
    fn test_release_volumes_forces_reallocation() {
        let mut pipeline = pipeline();
        let config = CloudNoiseConfig::default();
        pipeline.generate(&config).unwrap();

        pipeline.release_volumes();
        assert_eq!(pipeline.base_volume(), None);
        assert!(matches!(
            pipeline.generate(&config).unwrap(),
            GenerateOutcome::Generated(_)
        ));
        assert_eq!(pipeline.host().volume_allocations(), 4);
    }
}
