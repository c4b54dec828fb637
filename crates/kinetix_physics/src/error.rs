//! Error types for the physics system

use thiserror::Error;

/// Physics system errors
///
/// Every variant is a caller contract violation; numeric edge cases and
/// inactive entities never produce an error.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Step called with the wrong number of per-joint/per-thruster actions
    #[error("Action vector has length {actual}, expected {expected}")]
    ActionLength { expected: usize, actual: usize },

    /// Binding action vector does not match the configured binding counts
    #[error("Binding action vector has length {actual}, expected {expected}")]
    BindingActionLength { expected: usize, actual: usize },

    /// A joint, thruster or binding refers past the end of its array
    #[error("Index {index} out of range for {len} slots")]
    BodyIndexOutOfRange { index: usize, len: usize },

    /// Polygons need between 3 and 4 vertices
    #[error("Polygon must have 3 or 4 vertices, got {0}")]
    InvalidVertexCount(usize),

    /// Scene arrays do not agree with the static parameters
    #[error("Capacity mismatch for {what}: expected {expected}, got {actual}")]
    CapacityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// No inactive slot is left to create an entity in
    #[error("No free {0} slot")]
    CapacityExhausted(&'static str),

    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// Compressed parameters named a size preset that does not exist
    #[error("Unknown size preset: {0}")]
    UnknownSizePreset(String),

    /// Level document is not valid JSON
    #[error("Level JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Level document parsed but is structurally invalid
    #[error("Invalid level: {0}")]
    Level(String),
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
