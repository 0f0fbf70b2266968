//! Error types untuk setup dan lifecycle segment
//!
//! Hanya kegagalan setup (nama invalid, segment tidak ada, permission,
//! geometry berbeda) yang menjadi error. Ring penuh, ring kosong, commit
//! out-of-order, dan posisi consumer yang stale adalah hasil protokol biasa
//! dan dikembalikan sebagai hasil kosong / `false`.

use std::io;
use thiserror::Error;

/// Result alias untuk operasi disruptor
pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Geometry segment: jumlah elemen, ukuran elemen, jumlah consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub num_elements: u32,
    pub element_size: u32,
    pub num_consumers: u32,
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} elements x {} bytes, {} consumers",
            self.num_elements, self.element_size, self.num_consumers
        )
    }
}

#[derive(Debug, Error)]
pub enum DisruptorError {
    /// Nama shared memory tidak valid untuk `shm_open`
    #[error("invalid shared memory name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Parameter konstruksi tidak konsisten
    #[error("invalid disruptor configuration: {0}")]
    InvalidConfig(String),

    /// `shm_open`, `ftruncate`, `fstat`, `mmap`, `shm_unlink` gagal
    #[error("{op} failed for `{name}`: {source}")]
    Shm {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    /// Segment ada tapi belum pernah di-init
    #[error("shared memory `{name}` has not been initialized")]
    NotInitialized { name: String },

    /// Segment di-init dengan parameter berbeda
    #[error("shared memory `{name}` geometry mismatch: expected {expected}, found {actual}")]
    GeometryMismatch {
        name: String,
        expected: Geometry,
        actual: Geometry,
    },

    /// Ukuran object lebih kecil dari layout yang diharapkan
    #[error("shared memory `{name}` size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: u64,
    },

    /// Handle sudah di-release
    #[error("disruptor handle has been released")]
    Released,

    /// Platform tanpa POSIX shared memory
    #[error("named shared memory is not supported on this platform")]
    Unsupported,
}

impl DisruptorError {
    pub(crate) fn shm(op: &'static str, name: &str, source: io::Error) -> Self {
        Self::Shm {
            op,
            name: name.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_error_keeps_platform_message() {
        let err = DisruptorError::shm(
            "shm_open",
            "/missing",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("shm_open failed for `/missing`"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_geometry_display() {
        let err = DisruptorError::GeometryMismatch {
            name: "/ring".into(),
            expected: Geometry {
                num_elements: 256,
                element_size: 8,
                num_consumers: 1,
            },
            actual: Geometry {
                num_elements: 128,
                element_size: 8,
                num_consumers: 1,
            },
        };
        assert_eq!(
            err.to_string(),
            "shared memory `/ring` geometry mismatch: expected 256 elements x 8 bytes, \
             1 consumers, found 128 elements x 8 bytes, 1 consumers"
        );
    }
}
