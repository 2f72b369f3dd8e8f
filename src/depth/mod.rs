//! Depth filtering and fusion
//!
//! - [`filter::DepthFilter`]: baseline-relative, dead-zone gated, smoothed depth per modality
//! - [`fusion::DepthFusion`]: face-anchored weighted blend with pose/hand fallback
//! - [`cell::DepthCell`]: lock-free published reading for other threads

pub mod cell;
pub mod filter;
pub mod fusion;

pub use cell::{DepthCell, DepthReading};
pub use filter::DepthFilter;
pub use fusion::{DepthFusion, FusionInputs};

/// Linear interpolation with `t` clamped to [0, 1]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}
