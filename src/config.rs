//! Parameter konstruksi disruptor
//!
//! Semua participant yang attach ke nama yang sama HARUS memakai
//! `num_elements`, `element_size`, dan `num_consumers` yang identik.

use crate::core::HEADER_SIZE;
use crate::error::{DisruptorError, Geometry, Result};

/// Konfigurasi satu handle disruptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisruptorConfig {
    /// Nama POSIX shared memory (contoh: `/prices`)
    pub name: String,
    /// Kapasitas ring dalam elemen
    pub num_elements: u32,
    /// Ukuran satu elemen dalam bytes
    pub element_size: u32,
    /// Total consumer yang membaca ring
    pub num_consumers: u32,
    /// ID consumer handle ini (tidak relevan untuk producer murni)
    pub consumer: u32,
    /// Buat (atau truncate) dan zero-init segment
    pub init: bool,
    /// Retry sampai berhasil, bukan return hasil kosong
    pub spin: bool,
}

impl DisruptorConfig {
    pub fn new(
        name: impl Into<String>,
        num_elements: u32,
        element_size: u32,
        num_consumers: u32,
    ) -> Self {
        Self {
            name: name.into(),
            num_elements,
            element_size,
            num_consumers,
            consumer: 0,
            init: false,
            spin: false,
        }
    }

    pub fn consumer(mut self, consumer: u32) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    pub fn spin(mut self, spin: bool) -> Self {
        self.spin = spin;
        self
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            num_elements: self.num_elements,
            element_size: self.element_size,
            num_consumers: self.num_consumers,
        }
    }

    /// Total bytes segment: header + consumer table + element array
    pub fn segment_size(&self) -> Option<usize> {
        let consumers = (self.num_consumers as usize).checked_mul(8)?;
        let elements = (self.num_elements as usize).checked_mul(self.element_size as usize)?;
        HEADER_SIZE.checked_add(consumers)?.checked_add(elements)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_elements == 0 {
            return Err(DisruptorError::InvalidConfig(
                "num_elements must be at least 1".into(),
            ));
        }
        if self.element_size == 0 {
            return Err(DisruptorError::InvalidConfig(
                "element_size must be at least 1".into(),
            ));
        }
        if self.num_consumers == 0 {
            return Err(DisruptorError::InvalidConfig(
                "num_consumers must be at least 1".into(),
            ));
        }
        if self.consumer >= self.num_consumers {
            return Err(DisruptorError::InvalidConfig(format!(
                "consumer id {} out of range for {} consumers",
                self.consumer, self.num_consumers
            )));
        }
        if self.segment_size().is_none() {
            return Err(DisruptorError::InvalidConfig(
                "segment size overflows usize".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cfg = DisruptorConfig::new("/ring", 256, 8, 2);
        assert_eq!(cfg.consumer, 0);
        assert!(!cfg.init);
        assert!(!cfg.spin);

        let cfg = cfg.consumer(1).init(true).spin(true);
        assert_eq!(cfg.consumer, 1);
        assert!(cfg.init && cfg.spin);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_segment_size() {
        let cfg = DisruptorConfig::new("/ring", 256, 8, 3);
        assert_eq!(cfg.segment_size(), Some(HEADER_SIZE + 3 * 8 + 256 * 8));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        assert!(DisruptorConfig::new("/r", 0, 8, 1).validate().is_err());
        assert!(DisruptorConfig::new("/r", 8, 0, 1).validate().is_err());
        assert!(DisruptorConfig::new("/r", 8, 8, 0).validate().is_err());

        let err = DisruptorConfig::new("/r", 8, 8, 2)
            .consumer(2)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DisruptorError::InvalidConfig(_)));
    }
}
