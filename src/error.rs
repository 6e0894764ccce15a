//! Error type shared by registration, instantiation and configuration loading.

use std::fmt;

/// Error type for map processor operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapProcError {
    /// Empty or over-long processor name, or a malformed template/rule.
    Validation(String),
    /// Instance data could not be created.
    Allocation(String),
    /// The processor's instantiate capability rejected the configuration.
    Instantiation {
        processor: String,
        reason: String,
    },
    /// The source template could not be expanded for a request.
    Expansion(String),
    /// No processor registered under the given name.
    NotFound(String),
    /// Configuration file could not be read or parsed.
    Config(String),
}

impl fmt::Display for MapProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapProcError::Validation(msg) => write!(f, "Validation error: {}", msg),
            MapProcError::Allocation(msg) => write!(f, "Allocation error: {}", msg),
            MapProcError::Instantiation { processor, reason } => {
                write!(f, "Failed to instantiate map processor '{}': {}", processor, reason)
            }
            MapProcError::Expansion(msg) => write!(f, "Expansion failed: {}", msg),
            MapProcError::NotFound(name) => write!(f, "Map processor not found: {}", name),
            MapProcError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for MapProcError {}

impl From<serde_yaml::Error> for MapProcError {
    fn from(err: serde_yaml::Error) -> Self {
        MapProcError::Config(format!("Failed to parse YAML: {}", err))
    }
}

impl From<std::io::Error> for MapProcError {
    fn from(err: std::io::Error) -> Self {
        MapProcError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapProcError>;
