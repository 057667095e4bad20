//! Error types for Marionette
//!
//! Caller-supplied data never produces an error at tick time: unknown names
//! fall back or no-op, out-of-range values are clamped. Errors only surface
//! while loading configuration or constructing an [`crate::animation::Animator`].

use thiserror::Error;

/// Main error type for Marionette
#[derive(Error, Debug)]
pub enum MarionetteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Character profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Per-character profile errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile: {0}")]
    ReadFile(String),

    #[error("Failed to parse profile: {0}")]
    Parse(String),

    #[error("Invalid profile value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Command decoding errors (command sources only; dispatch itself never fails)
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to decode command: {0}")]
    Decode(String),

    #[error("Command inbox is full ({0} pending)")]
    Full(usize),

    #[error("Command inbox disconnected")]
    Disconnected,
}

/// Result type alias for Marionette operations
pub type Result<T> = std::result::Result<T, MarionetteError>;
