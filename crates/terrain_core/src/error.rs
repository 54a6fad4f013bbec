//! Error type shared by the terrain core.
//!
//! Nothing on the per-tick path returns these to the host: the simulation
//! logs them and degrades to "no deformation / no force" for that tick.
//! They surface only from fallible setup calls (config, height map, model
//! loading) and from tile parsing, where the map recovers by regenerating.

use std::path::Path;

/// Errors that can occur in terrain setup, persistence or inference.
#[derive(Debug)]
pub enum TerrainError {
    /// File system error
    Io(std::io::Error),
    /// A persisted tile could not be parsed.
    MalformedTile {
        /// 1-based line number of the offending record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// No force model is loaded.
    InferenceUnavailable,
    /// The force model failed during a forward pass.
    Inference(String),
    /// Force model weights could not be loaded.
    ModelLoad(String),
    /// Invalid or unreadable configuration.
    Config(String),
    /// Height map buffer does not match its declared dimensions.
    HeightMap(String),
    /// Height map image could not be decoded.
    Image(String),
}

impl std::fmt::Display for TerrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerrainError::Io(e) => write!(f, "IO error: {}", e),
            TerrainError::MalformedTile { line, reason } => {
                write!(f, "Malformed tile data at line {}: {}", line, reason)
            }
            TerrainError::InferenceUnavailable => write!(f, "Force model is not loaded"),
            TerrainError::Inference(e) => write!(f, "Inference error: {}", e),
            TerrainError::ModelLoad(e) => write!(f, "Model load error: {}", e),
            TerrainError::Config(e) => write!(f, "Config error: {}", e),
            TerrainError::HeightMap(e) => write!(f, "Height map error: {}", e),
            TerrainError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for TerrainError {}

impl From<std::io::Error> for TerrainError {
    fn from(e: std::io::Error) -> Self {
        TerrainError::Io(e)
    }
}

impl From<candle_core::Error> for TerrainError {
    fn from(e: candle_core::Error) -> Self {
        TerrainError::Inference(e.to_string())
    }
}

impl From<serde_json::Error> for TerrainError {
    fn from(e: serde_json::Error) -> Self {
        TerrainError::Config(e.to_string())
    }
}

impl From<image::ImageError> for TerrainError {
    fn from(e: image::ImageError) -> Self {
        TerrainError::Image(e.to_string())
    }
}

impl TerrainError {
    /// Shorthand for a parse failure at `line`.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TerrainError::MalformedTile {
            line,
            reason: reason.into(),
        }
    }

    /// Attach the offending path to an I/O style error message.
    pub fn config_at(path: &Path, e: impl std::fmt::Display) -> Self {
        TerrainError::Config(format!("{}: {}", path.display(), e))
    }
}

/// Result type for terrain operations.
pub type TerrainResult<T> = Result<T, TerrainError>;
