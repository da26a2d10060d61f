//! Error handling for wavepipe-rs
//!
//! Pipeline errors live in [`crate::pipeline::error`]; this module wraps them
//! together with the I/O, image and serialization failures of the outer layers
//! (configuration, frame sources, port persistence, manifest).

use crate::pipeline::error::{ConfigError, RunError};
use thiserror::Error;

/// Main error type for wavepipe-rs operations
#[derive(Error, Debug)]
pub enum WavepipeError {
    /// Pipeline wiring errors raised while building
    #[error("Pipeline configuration error: {0}")]
    Pipeline(#[from] ConfigError),

    /// Errors that ended a run
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to image decoding/encoding
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Buffer shape errors
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<WavepipeError>,
    },
}

impl WavepipeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        WavepipeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for WavepipeError {
    fn from(err: serde_json::Error) -> Self {
        WavepipeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WavepipeError {
    fn from(err: toml::de::Error) -> Self {
        WavepipeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WavepipeError {
    fn from(err: toml::ser::Error) -> Self {
        WavepipeError::Serialization(err.to_string())
    }
}

/// Result type alias for wavepipe-rs operations
pub type Result<T> = std::result::Result<T, WavepipeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WavepipeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
