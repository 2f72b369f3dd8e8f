//! MediaPipe landmark message decoding
//!
//! Each tracker server writes one JSON object per line. The payload shape
//! depends on the modality; only the depth scalar is consumed, the landmark
//! collections are decoded to validate the payload shape. Unknown fields
//! (blendshapes, timing) are ignored.

use serde::Deserialize;

use crate::error::DecodeError;
use crate::tracking::Modality;

/// A single normalized or world-space landmark
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

/// Pose server payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoseMessage {
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub world_landmarks: Vec<Landmark>,
    /// Representative body depth computed server-side (may be null)
    #[serde(default)]
    pub depth_z: Option<f32>,
}

/// One detected hand
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandEntry {
    /// "Left", "Right" or "Unknown"
    #[serde(default)]
    pub handedness: String,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub world_landmarks: Vec<Landmark>,
    /// Median palm depth; omitted by the server when world landmarks are missing
    #[serde(default)]
    pub depth_z: Option<f32>,
}

/// Hand server payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandMessage {
    #[serde(default)]
    pub hands: Vec<HandEntry>,
}

/// Translation part of the facial transformation matrix
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FacePose {
    #[serde(default)]
    pub tx: f32,
    #[serde(default)]
    pub ty: f32,
    /// Forward/back axis
    #[serde(default)]
    pub tz: Option<f32>,
}

/// One detected face
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaceEntry {
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub face_pose: Option<FacePose>,
}

/// Face server payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaceMessage {
    #[serde(default)]
    pub faces: Vec<FaceEntry>,
}

/// A decoded frame for any modality
#[derive(Debug, Clone)]
pub enum TrackingMessage {
    Pose(PoseMessage),
    Hand(HandMessage),
    Face(FaceMessage),
}

/// What a decoded frame says about depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthSample {
    /// Raw (unscaled) depth scalar
    Depth(f32),
    /// Frame decoded but carried no usable depth
    Missing,
    /// No face in frame; the face filter recentres instead of freezing
    Lost,
}

impl TrackingMessage {
    pub fn modality(&self) -> Modality {
        match self {
            Self::Pose(_) => Modality::Pose,
            Self::Hand(_) => Modality::Hand,
            Self::Face(_) => Modality::Face,
        }
    }

    /// Extract the single raw depth scalar for this frame.
    ///
    /// Non-finite values are rejected with [`DecodeError::NonFinite`] so
    /// they never reach a filter.
    pub fn depth_sample(&self) -> Result<DepthSample, DecodeError> {
        let raw = match self {
            Self::Pose(pose) => pose.depth_z,
            // First-listed hand, not the nearest one
            Self::Hand(hand) => match hand.hands.first() {
                Some(h0) => h0.depth_z,
                None => return Ok(DepthSample::Missing),
            },
            Self::Face(face) => match face.faces.first().and_then(|f| f.face_pose) {
                Some(pose) => pose.tz,
                None => return Ok(DepthSample::Lost),
            },
        };

        match raw {
            Some(value) if value.is_finite() => Ok(DepthSample::Depth(value)),
            Some(value) => Err(DecodeError::NonFinite {
                modality: self.modality(),
                value,
            }),
            None => Ok(DepthSample::Missing),
        }
    }
}

/// Parse one framed message for the given modality
pub fn decode(modality: Modality, frame: &[u8]) -> Result<TrackingMessage, DecodeError> {
    let json_err = |e: serde_json::Error| DecodeError::Json {
        modality,
        message: e.to_string(),
    };

    let message = match modality {
        Modality::Pose => TrackingMessage::Pose(serde_json::from_slice(frame).map_err(json_err)?),
        Modality::Hand => TrackingMessage::Hand(serde_json::from_slice(frame).map_err(json_err)?),
        Modality::Face => TrackingMessage::Face(serde_json::from_slice(frame).map_err(json_err)?),
    };

    Ok(message)
}
