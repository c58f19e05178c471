//! Cloudnoise library - tileable base and detail noise volumes for clouds

pub mod buffers;
pub mod cli;
pub mod dirty;
pub mod error;
pub mod host;
pub mod params;
pub mod pipeline;
pub mod sampler;
pub mod volume;

pub use error::{NoiseError, NoiseResult};
pub use pipeline::{GenerateOutcome, NoisePipeline, PassReport, PassTiming};
