//! Cross-modality depth fusion.
//!
//! Face anchors the blend whenever it is available; pose and hand only
//! corroborate it. Without face, pose wins over hand. The fused value is
//! smoothed toward the chosen target every tick.

use crate::config::FusionConfig;
use crate::depth::{lerp, DepthReading};

/// Floor for the combined weight so an all-zero weighting cannot divide by zero
const WEIGHT_EPSILON: f32 = 1e-6;

/// Per-tick modality readings. `None` means the modality is not bound to this fusion.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInputs {
    pub face: Option<DepthReading>,
    pub pose: Option<DepthReading>,
    pub hand: Option<DepthReading>,
}

#[derive(Debug, Clone)]
pub struct DepthFusion {
    config: FusionConfig,
    fused_depth: f32,
    has_depth: bool,
}

impl DepthFusion {
    pub fn new(config: &FusionConfig) -> Self {
        Self {
            config: config.clone(),
            fused_depth: 0.0,
            has_depth: false,
        }
    }

    /// Unsmoothed target and availability for this set of readings
    pub fn target(&self, inputs: &FusionInputs) -> (f32, bool) {
        let face = inputs.face.and_then(DepthReading::available);
        let pose = inputs.pose.and_then(DepthReading::available);
        let hand = inputs.hand.and_then(DepthReading::available);

        if let Some(face) = face {
            // Unavailable modalities drop out of both sums
            let mut weighted = self.config.face_weight * face.depth;
            let mut weights = self.config.face_weight;

            if let Some(pose) = pose {
                weighted += self.config.pose_weight * pose.depth;
                weights += self.config.pose_weight;
            }
            if let Some(hand) = hand {
                weighted += self.config.hand_weight * hand.depth;
                weights += self.config.hand_weight;
            }

            (weighted / weights.max(WEIGHT_EPSILON), true)
        } else if let Some(pose) = pose {
            (pose.depth, true)
        } else if let Some(hand) = hand {
            (hand.depth, true)
        } else {
            (0.0, false)
        }
    }

    /// Advance one tick
    pub fn update(&mut self, inputs: &FusionInputs) -> DepthReading {
        let (target, available) = self.target(inputs);

        self.fused_depth = if self.config.smoothing_enabled {
            lerp(self.fused_depth, target, self.config.smoothing_factor)
        } else {
            target
        };
        self.has_depth = available;

        self.reading()
    }

    pub fn reading(&self) -> DepthReading {
        DepthReading::new(self.fused_depth, self.has_depth)
    }

    pub fn fused_depth(&self) -> f32 {
        self.fused_depth
    }

    pub fn has_depth(&self) -> bool {
        self.has_depth
    }
}
