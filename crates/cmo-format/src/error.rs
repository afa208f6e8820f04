//! Error types for composition file operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading or writing composition files.
///
/// Each variant maps onto one of the engine's legacy error codes, see
/// [`CmoError::code`].
#[derive(Debug, Error)]
pub enum CmoError {
    /// A required argument was absent or out of range.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Bad magic, inconsistent sizes, or otherwise unreadable bytes.
    #[error("invalid file: {message}")]
    InvalidFile { message: String },

    /// The declared file version is outside the supported window.
    #[error("file version {version} is not supported (expected 7..=9)")]
    ObsoleteVersion { version: u32 },

    /// Neither checksum algorithm agrees with the stored value.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// A declared size could not be allocated.
    #[error("out of memory: {message}")]
    OutOfMemory { message: String },

    /// The operation was already performed on this instance.
    #[error("operation cancelled: {message}")]
    Cancelled { message: String },

    /// The destination could not be opened for writing.
    #[error("cannot write to file: {path}")]
    CantWriteFile { path: PathBuf },

    /// zlib stream failure.
    #[error("compression error: {message}")]
    Compression { message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for composition file operations.
pub type Result<T> = std::result::Result<T, CmoError>;

/// Result type alias for state chunk primitives and object models.
pub type ChunkResult<T> = std::result::Result<T, ChunkError>;

impl CmoError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an InvalidFile error.
    pub fn invalid_file(message: impl Into<String>) -> Self {
        Self::InvalidFile {
            message: message.into(),
        }
    }

    /// Create an OutOfMemory error.
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }

    /// Create a Cancelled error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Legacy numeric error code (`CKERROR`).
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidParameter { .. } => -1,
            Self::OutOfMemory { .. } => -6,
            Self::InvalidFile { .. } | Self::Compression { .. } => -22,
            Self::CantWriteFile { .. } | Self::Io(_) => -50,
            Self::ObsoleteVersion { .. } => -56,
            Self::CrcMismatch { .. } => -57,
            Self::Cancelled { .. } => -59,
        }
    }

    /// Symbolic name of the legacy error code.
    #[must_use]
    pub const fn error_name(&self) -> &'static str {
        match self.code() {
            -1 => "CKERR_INVALIDPARAMETER",
            -6 => "CKERR_OUTOFMEMORY",
            -22 => "CKERR_INVALIDFILE",
            -50 => "CKERR_CANTWRITETOFILE",
            -56 => "CKERR_OBSOLETEVIRTOOLS",
            -57 => "CKERR_FILECRCERROR",
            _ => "CKERR_CANCELLED",
        }
    }
}

/// Failure of a single state chunk primitive.
///
/// Chunk reads never abort a whole load; callers decide per field whether a
/// failure is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// The chunk is not in the state the primitive requires.
    #[error("chunk is not {expected}")]
    WrongState { expected: &'static str },

    /// The access would leave the valid word range.
    #[error("chunk access out of bounds: {requested} words at {position}, limit {limit}")]
    OutOfBounds {
        position: usize,
        requested: usize,
        limit: usize,
    },

    /// The identifier chain does not contain the tag.
    #[error("identifier {tag:#x} not found")]
    IdentifierNotFound { tag: u32 },

    /// A string could not be converted with any configured encoding.
    #[error("string encoding failed: {message}")]
    Encoding { message: String },

    /// A stored file index does not name an object in the bound file.
    #[error("object index {index} cannot be resolved")]
    Unresolved { index: u32 },

    /// Serialized bytes do not form a valid chunk.
    #[error("malformed chunk: {message}")]
    Malformed { message: String },
}

impl ChunkError {
    pub(crate) fn out_of_bounds(position: usize, requested: usize, limit: usize) -> Self {
        Self::OutOfBounds {
            position,
            requested,
            limit,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<ChunkError> for CmoError {
    fn from(err: ChunkError) -> Self {
        Self::invalid_file(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CmoError::invalid_file("bad magic");
        assert_eq!(format!("{err}"), "invalid file: bad magic");

        let err = CmoError::CrcMismatch {
            stored: 0x10,
            computed: 0x20,
        };
        assert_eq!(
            format!("{err}"),
            "checksum mismatch: stored 0x00000010, computed 0x00000020"
        );
    }

    #[test]
    fn test_legacy_codes() {
        assert_eq!(CmoError::invalid_parameter("x").code(), -1);
        assert_eq!(CmoError::invalid_file("x").code(), -22);
        assert_eq!(CmoError::ObsoleteVersion { version: 6 }.code(), -56);
        assert_eq!(
            CmoError::CrcMismatch {
                stored: 0,
                computed: 1
            }
            .error_name(),
            "CKERR_FILECRCERROR"
        );
        assert_eq!(CmoError::cancelled("x").error_name(), "CKERR_CANCELLED");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: CmoError = io_err.into();
        assert!(matches!(err, CmoError::Io(_)));
    }

    #[test]
    fn test_chunk_error_conversion() {
        let err: CmoError = ChunkError::out_of_bounds(3, 2, 4).into();
        assert!(matches!(err, CmoError::InvalidFile { .. }));
    }
}
