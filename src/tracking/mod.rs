//! Tracking module
//!
//! Body-tracking feeds delivered as newline-delimited MediaPipe JSON:
//! - Pose (top-level `depth_z`)
//! - Hand (per-hand `depth_z`, first hand wins)
//! - Face (`face_pose.tz` of the first face)

pub mod mediapipe;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use mediapipe::{decode, DepthSample, TrackingMessage};

/// One tracked signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Pose,
    Hand,
    Face,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Self::Pose, Self::Hand, Self::Face];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::Hand => "hand",
            Self::Face => "face",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
