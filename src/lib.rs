//! Depthwall - multi-modality depth streaming and fusion
//!
//! Ingests MediaPipe pose, hand and face streams from tracker servers and
//! turns each stream's noisy depth into one stable fused depth:
//! - Per-connection reader threads with newline framing and a latest-wins mailbox
//! - Per-modality baseline-relative, dead-zone gated, smoothed depth
//! - Face-anchored weighted fusion with pose/hand fallback

pub mod config;
pub mod depth;
pub mod error;
pub mod stream;
pub mod tracking;
pub mod wall;

pub use config::Config;
pub use depth::{DepthCell, DepthReading};
pub use error::{DepthwallError, Result};
pub use tracking::Modality;
pub use wall::{ModalityPipeline, Wall};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
