//! Configuration parsing and management for Depthwall

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, DepthwallError};
use crate::tracking::Modality;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub stream: StreamConfig,
    pub filters: FiltersConfig,
    pub walls: Vec<WallConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            stream: StreamConfig::default(),
            filters: FiltersConfig::default(),
            walls: vec![WallConfig::default()],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DepthwallError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, DepthwallError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, DepthwallError> {
        let paths = [
            PathBuf::from("depthwall.toml"),
            PathBuf::from("config/depthwall.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DepthwallError> {
        if self.runtime.tick_hz == 0 {
            return Err(invalid("runtime.tick_hz", "Tick rate must be greater than 0"));
        }

        if self.stream.poll_interval_ms >= self.stream.close_timeout_ms {
            return Err(invalid(
                "stream.close_timeout_ms",
                "Close timeout must be longer than the poll interval",
            ));
        }
        if self.stream.read_buffer_bytes == 0 {
            return Err(invalid(
                "stream.read_buffer_bytes",
                "Read buffer must be greater than 0",
            ));
        }
        if self.stream.max_frame_bytes < self.stream.read_buffer_bytes {
            return Err(invalid(
                "stream.max_frame_bytes",
                "Frame limit must be at least the read buffer size",
            ));
        }

        for modality in Modality::ALL {
            self.filters
                .get(modality)
                .validate(&format!("filters.{}", modality), modality)?;
        }

        if self.walls.is_empty() {
            return Err(invalid("walls", "At least one wall must be configured"));
        }

        let mut names = HashSet::new();
        for (i, wall) in self.walls.iter().enumerate() {
            let prefix = format!("walls[{}]", i);
            if !names.insert(wall.name.as_str()) {
                return Err(invalid(
                    &format!("{}.name", prefix),
                    &format!("Duplicate wall name '{}'", wall.name),
                ));
            }
            wall.validate(&prefix)?;
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> DepthwallError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn check_unit_interval(field: &str, value: f32, allow_zero: bool) -> Result<(), DepthwallError> {
    let ok = if allow_zero {
        (0.0..=1.0).contains(&value)
    } else {
        value > 0.0 && value <= 1.0
    };
    if ok {
        Ok(())
    } else if allow_zero {
        Err(invalid(field, "Value must be between 0.0 and 1.0"))
    } else {
        Err(invalid(field, "Value must be in (0.0, 1.0]"))
    }
}

/// Consumer loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Consumer ticks per second
    pub tick_hz: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_hz: 60 }
    }
}

/// Reader thread and framing configuration (shared by every connection)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sleep between reads when no bytes are available
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for a reader thread during close
    pub close_timeout_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Socket read chunk size
    pub read_buffer_bytes: usize,
    /// Longest accepted line; longer partial lines are dropped
    pub max_frame_bytes: usize,
    /// Ticks without a new frame before a modality reports no depth.
    ///
    /// Until then `has_depth` keeps the value from the last decoded frame,
    /// so a tracker slower than the tick rate does not flicker. Set to 0 to
    /// report depth only on ticks that decoded a new sample.
    pub stale_after_ticks: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            close_timeout_ms: 100,
            connect_timeout_ms: 2000,
            read_buffer_bytes: 16384,
            max_frame_bytes: 1024 * 1024,
            stale_after_ticks: 6,
        }
    }
}

/// Depth filter parameters for one modality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Raw unit multiplier; defaults to 1 for face and 1000 for pose/hand
    pub scale: Option<f32>,
    /// Flip the sign of the scaled sample
    pub invert_sign: bool,
    /// Exponential smoothing factor in (0, 1]
    pub smoothing_factor: f32,
    /// Minimum change that moves the depth at all
    pub deadzone: f32,
    /// Apply smoothing (otherwise depth follows the gated delta directly)
    pub enabled: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            scale: None,
            invert_sign: true,
            smoothing_factor: 0.15,
            deadzone: 0.002,
            enabled: true,
        }
    }
}

impl FilterConfig {
    /// Effective scale for a modality
    pub fn scale_for(&self, modality: Modality) -> f32 {
        self.scale.unwrap_or(match modality {
            Modality::Face => 1.0,
            Modality::Pose | Modality::Hand => 1000.0,
        })
    }

    fn validate(&self, prefix: &str, modality: Modality) -> Result<(), DepthwallError> {
        let scale = self.scale_for(modality);
        if !scale.is_finite() || scale == 0.0 {
            return Err(invalid(
                &format!("{}.scale", prefix),
                "Scale must be finite and non-zero",
            ));
        }
        check_unit_interval(
            &format!("{}.smoothing_factor", prefix),
            self.smoothing_factor,
            false,
        )?;
        if !self.deadzone.is_finite() || self.deadzone < 0.0 {
            return Err(invalid(
                &format!("{}.deadzone", prefix),
                "Dead-zone must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

/// Per-modality filter tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub face: FilterConfig,
    pub pose: FilterConfig,
    pub hand: FilterConfig,
}

impl FiltersConfig {
    pub fn get(&self, modality: Modality) -> &FilterConfig {
        match modality {
            Modality::Face => &self.face,
            Modality::Pose => &self.pose,
            Modality::Hand => &self.hand,
        }
    }
}

/// Tracker server socket ports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub pose: u16,
    pub hand: u16,
    pub face: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            pose: 5050,
            hand: 5051,
            face: 5052,
        }
    }
}

impl PortsConfig {
    pub fn port_for(&self, modality: Modality) -> u16 {
        match modality {
            Modality::Pose => self.pose,
            Modality::Hand => self.hand,
            Modality::Face => self.face,
        }
    }
}

/// Fusion weights and smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub face_weight: f32,
    pub pose_weight: f32,
    pub hand_weight: f32,
    pub smoothing_enabled: bool,
    pub smoothing_factor: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            face_weight: 0.8,
            pose_weight: 0.8,
            hand_weight: 0.8,
            smoothing_enabled: true,
            smoothing_factor: 0.2,
        }
    }
}

/// One fused target: a host, its modality feeds and a fusion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub name: String,
    pub host: String,
    /// Connect every feed when the wall is created
    pub auto_connect: bool,
    pub modalities: Vec<Modality>,
    pub ports: PortsConfig,
    pub fusion: FusionConfig,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            name: "wall1".to_string(),
            host: "127.0.0.1".to_string(),
            auto_connect: true,
            modalities: vec![Modality::Face],
            ports: PortsConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl WallConfig {
    fn validate(&self, prefix: &str) -> Result<(), DepthwallError> {
        if self.name.trim().is_empty() {
            return Err(invalid(&format!("{}.name", prefix), "Name must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(invalid(&format!("{}.host", prefix), "Host must not be empty"));
        }
        if self.modalities.is_empty() {
            return Err(invalid(
                &format!("{}.modalities", prefix),
                "At least one modality is required",
            ));
        }

        let mut seen = HashSet::new();
        for &modality in &self.modalities {
            if !seen.insert(modality) {
                return Err(invalid(
                    &format!("{}.modalities", prefix),
                    &format!("Modality '{}' listed twice", modality),
                ));
            }
            if self.ports.port_for(modality) == 0 {
                return Err(invalid(
                    &format!("{}.ports.{}", prefix, modality),
                    "Port must be greater than 0",
                ));
            }
        }

        let fusion = &self.fusion;
        check_unit_interval(&format!("{}.fusion.face_weight", prefix), fusion.face_weight, true)?;
        check_unit_interval(&format!("{}.fusion.pose_weight", prefix), fusion.pose_weight, true)?;
        check_unit_interval(&format!("{}.fusion.hand_weight", prefix), fusion.hand_weight, true)?;
        check_unit_interval(
            &format!("{}.fusion.smoothing_factor", prefix),
            fusion.smoothing_factor,
            false,
        )?;

        Ok(())
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("depthwall");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/depthwall");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/depthwall");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("depthwall");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(result: Result<(), DepthwallError>) -> String {
        match result {
            Err(DepthwallError::Config(ConfigError::InvalidValue { field, .. })) => field,
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.runtime.tick_hz, 60);
        assert_eq!(config.stream.poll_interval_ms, 5);
        assert_eq!(config.walls.len(), 1);
        assert_eq!(config.walls[0].modalities, vec![Modality::Face]);
        assert_eq!(config.walls[0].ports.port_for(Modality::Hand), 5051);
        assert_eq!(config.filters.face.scale_for(Modality::Face), 1.0);
        assert_eq!(config.filters.pose.scale_for(Modality::Pose), 1000.0);
        assert!(config.filters.hand.invert_sign);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [runtime]
            tick_hz = 90

            [filters.pose]
            deadzone = 0.01

            [filters.hand]
            scale = 500.0
            invert_sign = false

            [[walls]]
            name = "left"
            host = "192.168.0.20"
            modalities = ["face", "pose", "hand"]

            [walls.fusion]
            face_weight = 1.0
            smoothing_enabled = false

            [[walls]]
            name = "right"
            modalities = ["hand"]
            auto_connect = false

            [walls.ports]
            hand = 6051
        "#;

        let config = Config::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.tick_hz, 90);

        // Partial tables keep the per-modality scale default
        assert_eq!(config.filters.pose.deadzone, 0.01);
        assert_eq!(config.filters.pose.scale_for(Modality::Pose), 1000.0);
        assert_eq!(config.filters.hand.scale_for(Modality::Hand), 500.0);
        assert!(!config.filters.hand.invert_sign);

        assert_eq!(config.walls.len(), 2);
        let left = &config.walls[0];
        assert_eq!(left.host, "192.168.0.20");
        assert_eq!(left.modalities.len(), 3);
        assert_eq!(left.fusion.face_weight, 1.0);
        assert_eq!(left.fusion.pose_weight, 0.8);
        assert!(!left.fusion.smoothing_enabled);

        let right = &config.walls[1];
        assert_eq!(right.host, "127.0.0.1");
        assert!(!right.auto_connect);
        assert_eq!(right.ports.port_for(Modality::Hand), 6051);
        assert_eq!(right.ports.port_for(Modality::Face), 5052);
    }

    #[test]
    fn test_parse_error() {
        let err = Config::from_str("[runtime]\ntick_hz = \"fast\"").unwrap_err();
        assert!(matches!(err, DepthwallError::Config(ConfigError::Parse(_))));

        let err = Config::from_str("[[walls]]\nmodalities = [\"lidar\"]").unwrap_err();
        assert!(matches!(err, DepthwallError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.runtime.tick_hz = 0;
        assert_eq!(invalid_field(config.validate()), "runtime.tick_hz");

        let mut config = Config::default();
        config.filters.face.smoothing_factor = 0.0;
        assert_eq!(invalid_field(config.validate()), "filters.face.smoothing_factor");

        let mut config = Config::default();
        config.filters.hand.deadzone = -0.1;
        assert_eq!(invalid_field(config.validate()), "filters.hand.deadzone");

        let mut config = Config::default();
        config.filters.pose.scale = Some(0.0);
        assert_eq!(invalid_field(config.validate()), "filters.pose.scale");

        let mut config = Config::default();
        config.walls[0].fusion.hand_weight = 1.5;
        assert_eq!(invalid_field(config.validate()), "walls[0].fusion.hand_weight");

        let mut config = Config::default();
        config.walls[0].modalities = vec![Modality::Face, Modality::Face];
        assert_eq!(invalid_field(config.validate()), "walls[0].modalities");

        let mut config = Config::default();
        config.walls[0].ports.face = 0;
        assert_eq!(invalid_field(config.validate()), "walls[0].ports.face");

        let mut config = Config::default();
        config.walls.push(WallConfig::default());
        assert_eq!(invalid_field(config.validate()), "walls[1].name");

        let mut config = Config::default();
        config.stream.max_frame_bytes = 16;
        assert_eq!(invalid_field(config.validate()), "stream.max_frame_bytes");
    }

    #[test]
    fn test_close_timeout_must_outlast_poll_interval() {
        let mut config = Config::default();
        config.stream.poll_interval_ms = 300;
        config.stream.close_timeout_ms = 50;
        assert_eq!(invalid_field(config.validate()), "stream.close_timeout_ms");

        config.stream.close_timeout_ms = 300;
        assert_eq!(invalid_field(config.validate()), "stream.close_timeout_ms");

        config.stream.close_timeout_ms = 301;
        assert!(config.validate().is_ok());
    }
}
