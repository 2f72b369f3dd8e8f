//! Per-modality depth filter.
//!
//! The first valid sample anchors the baseline; every later sample is turned
//! into a delta from that baseline, gated by a dead-zone and then smoothed
//! toward with an exponential lerp. The baseline is never re-captured for the
//! lifetime of the filter.

use crate::config::FilterConfig;
use crate::depth::{lerp, DepthReading};
use crate::tracking::Modality;

/// Rate at which the face filter recentres toward zero while no face is in frame
pub const FACE_RECENTER_RATE: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct DepthFilter {
    modality: Modality,
    scale: f32,
    invert_sign: bool,
    smoothing_factor: f32,
    deadzone: f32,
    enabled: bool,
    /// Scaled, sign-normalized depth of the first valid sample
    baseline: Option<f32>,
    user_depth: f32,
    has_depth: bool,
    last_raw: Option<f32>,
}

impl DepthFilter {
    pub fn new(modality: Modality, config: &FilterConfig) -> Self {
        Self {
            modality,
            scale: config.scale_for(modality),
            invert_sign: config.invert_sign,
            smoothing_factor: config.smoothing_factor,
            deadzone: config.deadzone,
            enabled: config.enabled,
            baseline: None,
            user_depth: 0.0,
            has_depth: false,
            last_raw: None,
        }
    }

    /// Start of a decode attempt: availability must be re-earned this tick.
    pub fn begin_decode(&mut self) {
        self.has_depth = false;
    }

    /// Feed one raw sample. Returns false (and leaves all state untouched)
    /// when the scaled sample is not a finite number.
    pub fn update(&mut self, raw: f32) -> bool {
        let scaled = raw * self.scale;
        if !scaled.is_finite() {
            tracing::debug!("[{}] discarding non-finite depth sample {}", self.modality, raw);
            return false;
        }

        let z = if self.invert_sign { -scaled } else { scaled };
        self.last_raw = Some(raw);

        match self.baseline {
            None => {
                tracing::debug!("[{}] depth baseline anchored at {:.4}", self.modality, z);
                self.baseline = Some(z);
                self.user_depth = 0.0;
            }
            Some(baseline) => {
                let mut delta = z - baseline;

                // Jitter inside the dead-zone does not move the target at all
                if (delta - self.user_depth).abs() < self.deadzone {
                    delta = self.user_depth;
                }

                self.user_depth = if self.enabled {
                    lerp(self.user_depth, delta, self.smoothing_factor)
                } else {
                    delta
                };
            }
        }

        self.has_depth = true;
        true
    }

    /// Pull the smoothed depth toward zero without touching the baseline.
    pub fn relax_toward_zero(&mut self, rate: f32) {
        self.user_depth = lerp(self.user_depth, 0.0, rate);
        self.has_depth = false;
    }

    /// No frame arrived for too long.
    pub fn mark_stale(&mut self) {
        self.has_depth = false;
    }

    pub fn reading(&self) -> DepthReading {
        DepthReading::new(self.user_depth, self.has_depth)
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn user_depth(&self) -> f32 {
        self.user_depth
    }

    pub fn has_depth(&self) -> bool {
        self.has_depth
    }

    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    pub fn is_initialized(&self) -> bool {
        self.baseline.is_some()
    }

    /// Last accepted raw (unscaled) sample
    pub fn last_raw(&self) -> Option<f32> {
        self.last_raw
    }
}
