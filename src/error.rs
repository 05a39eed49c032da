//! Unified error type for the streaming core.
//!
//! Expected failures on the streaming hot path (missing region slot, stale
//! generation, cone-culled tile) stay boolean/Option returns; this enum
//! carries the cases worth reporting, and the IO layer logs them through
//! their `Display` form before degrading to a cache miss.

use crate::world::core::FaceChunkKey;

/// Engine-level error cases
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("region file corrupted: {reason}")]
    CorruptRegion { reason: String },

    #[error("region version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("checksum mismatch for {key:?}: toc {expected:#010x}, blob {computed:#010x}")]
    ChecksumMismatch {
        key: FaceChunkKey,
        expected: u32,
        computed: u32,
    },

    #[error("mesh pool exhausted: requested {requested} bytes, {available} listed free")]
    PoolExhausted { requested: u64, available: u64 },

    #[error("invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },
}

/// Result alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        EngineError::CorruptRegion {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::VersionMismatch {
            expected: 1,
            found: 7,
        };
        assert_eq!(
            err.to_string(),
            "region version mismatch: expected 1, found 7"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = EngineError::io(
            "regions/face0/k1/r_0_0.wfr",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("r_0_0.wfr"));
    }

    #[test]
    fn test_pool_exhausted_display() {
        let err = EngineError::PoolExhausted {
            requested: 4096,
            available: 128,
        };
        assert!(err.to_string().contains("4096"));
        assert!(err.to_string().contains("128"));
    }
}
