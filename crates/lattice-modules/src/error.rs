//! Error types for module finding and resolution.

use thiserror::Error;

/// Result type for module system operations.
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Main error type for the module system.
#[derive(Error, Debug)]
pub enum ModuleError {
    /// Malformed module, package or class name
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// Malformed version string
    #[error("Invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    /// Two modules with the same name found in one scan
    #[error("Duplicate module '{name}' found in {location}")]
    DuplicateModule { name: String, location: String },

    /// A required module could not be found
    #[error("Module '{missing}' not found, required by '{requirer}'")]
    UnresolvedDependency { requirer: String, missing: String },

    /// The same package is supplied by two modules
    #[error("Package '{package}' is supplied by both '{first}' and '{second}'")]
    SplitPackage {
        package: String,
        first: String,
        second: String,
    },

    /// Cycle detected while ordering the module dependency graph
    #[error("Cycle detected in module graph at '{0}'")]
    CycleDetected(String),

    /// A module cannot be sourced from where its loader authority demands
    #[error("Loader mapping error: {0}")]
    LoaderMapping(String),

    /// Malformed descriptor source
    #[error("Invalid module descriptor: {0}")]
    DescriptorFormat(String),

    /// Descriptor invariant violated during construction
    #[error("Descriptor error for module '{module}': {reason}")]
    Descriptor { module: String, reason: String },

    /// Malformed packed module artifact
    #[error("Invalid module artifact {path}: {reason}")]
    Artifact { path: String, reason: String },

    /// Underlying storage failure while reading module content
    #[error("Content I/O error: {0}")]
    ContentIo(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Dependency resolution error
    #[error("Failed to resolve modules: {0}")]
    Resolution(String),

    /// Reader used after close
    #[error("Module reader is closed")]
    ReaderClosed,

    /// General error with message
    #[error("{0}")]
    Other(String),
}

impl From<String> for ModuleError {
    fn from(s: String) -> Self {
        ModuleError::Other(s)
    }
}

impl From<&str> for ModuleError {
    fn from(s: &str) -> Self {
        ModuleError::Other(s.to_string())
    }
}
