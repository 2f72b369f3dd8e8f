//! Error types for Depthwall

use thiserror::Error;

use crate::tracking::Modality;

/// Main error type for Depthwall
#[derive(Error, Debug)]
pub enum DepthwallError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Connection and reader errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Endpoint unreachable or refused at open time
    #[error("[{modality}] failed to connect to {addr}: {message}")]
    Connect {
        modality: Modality,
        addr: String,
        message: String,
    },

    /// I/O failure after the connection was established
    #[error("[{modality}] read failed: {message}")]
    Read { modality: Modality, message: String },

    #[error("[{modality}] stream closed by peer")]
    Closed { modality: Modality },

    #[error("Failed to spawn reader thread: {0}")]
    Spawn(String),
}

/// Message decoding errors (never fatal; the tick is treated as "no sample")
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("[{modality}] invalid JSON: {message}")]
    Json { modality: Modality, message: String },

    #[error("[{modality}] depth sample is not a finite number: {value}")]
    NonFinite { modality: Modality, value: f32 },
}

/// Result type alias for Depthwall operations
pub type Result<T> = std::result::Result<T, DepthwallError>;
