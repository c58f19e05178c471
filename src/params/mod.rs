//! Parameter definitions with documented semantics.
//!
//! Each noise family has a value type with defaults and a packed record
//! that is uploaded to the kernel unchanged.

mod config;
pub mod layout;
mod simplex;
mod worley;

// Re-export all types
pub use config::{CloudNoiseConfig, MAX_RESOLUTION};
pub use layout::{SimplexRecord, WorleyRecord};
pub use simplex::SimplexSettings;
pub use worley::{WorleySettings, MAX_TOTAL_POINTS};
