//! Error types for the typesetting host
//!
//! Each layer has its own error enum; [`TypesetError`] is the boundary type
//! returned to callers of a session.

use thiserror::Error;

/// Guest linear-memory access outside the buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Guest memory out of bounds: offset={offset}, len={len}, memory_size={size}")]
pub struct MemoryError {
    pub offset: usize,
    pub len: usize,
    pub size: usize,
}

/// Errors raised by virtual filesystem operations
///
/// All of these are guest contract violations and become traps.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("Invalid file handle: {0}")]
    BadHandle(i32),

    #[error("Cannot {operation} on {file}")]
    WrongDirection {
        operation: &'static str,
        file: &'static str,
    },

    #[error("Line of {line} bytes does not fit input buffer of {capacity} bytes")]
    LineOverflow { line: usize, capacity: usize },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Illegal suspension state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid suspension transition: {operation} while {state}")]
pub struct SuspendError {
    pub operation: &'static str,
    pub state: &'static str,
}

/// Errors that can occur while fetching assets
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to read resource {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inflate resource {name}: {source}")]
    Inflate {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {name}: {source}")]
    Manifest {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "http")]
    #[error("HTTP request for {name} failed: {source}")]
    Http {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors from the document renderer
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to start renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Renderer produced invalid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid host configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Continuation region of {continuation} pages does not fit in {memory} pages")]
    Geometry { memory: u32, continuation: u32 },

    #[error("Memory of {pages} pages exceeds the {max}-page limit")]
    MemoryTooLarge { pages: u32, max: u32 },

    #[error("At least one execution context is required")]
    NoContexts,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by a typesetting session
#[derive(Debug, Error)]
pub enum TypesetError {
    #[error("Required asset unavailable: {0}")]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Engine creation failed: {0}")]
    EngineCreation(#[source] anyhow::Error),

    #[error("Module compilation failed: {0}")]
    ModuleCompilation(#[source] anyhow::Error),

    #[error("Instantiation failed: {0}")]
    Instantiation(#[source] anyhow::Error),

    #[error("Guest export not found: {0}")]
    MissingExport(&'static str),

    #[error("Guest trapped: {source}")]
    GuestTrap {
        #[source]
        source: anyhow::Error,
        transcript: Vec<String>,
    },

    #[error("Fuel exhausted (CPU limit exceeded)")]
    FuelExhausted { transcript: Vec<String> },

    #[error("Typesetting produced no output")]
    NoOutput { transcript: Vec<String> },

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),
}

impl TypesetError {
    /// Console lines captured before the failure, if any
    pub fn transcript(&self) -> &[String] {
        match self {
            Self::GuestTrap { transcript, .. }
            | Self::FuelExhausted { transcript }
            | Self::NoOutput { transcript } => transcript,
            _ => &[],
        }
    }

    /// Whether the guest itself reported the failure
    pub fn is_guest_failure(&self) -> bool {
        matches!(self, Self::NoOutput { .. })
    }
}
