//! shm-disruptor - Multi-Producer Multi-Consumer Ring Buffer di Shared Memory
//!
//! Arsitektur:
//! - Zero-Copy: Producer menulis dan consumer membaca langsung di mmap region
//! - Lock-Free: Claim, commit, dan consume hanya memakai atomic CAS
//! - Multi-Process: Segment bernama (`shm_open`), setiap process attach sendiri
//! - Crash Recovery: Claim yang ditinggal producer bisa di-recover dan di-commit
//!
//! ```no_run
//! use shm_disruptor::{Disruptor, DisruptorConfig};
//!
//! // Process A: init dan produce
//! let mut producer = Disruptor::open(
//!     DisruptorConfig::new("/prices", 1024, 8, 1).init(true),
//! )?;
//! let mut claim = producer.claim_one()?;
//! if !claim.is_empty() {
//!     claim.bufs.copy_from_slice(&42u64.to_le_bytes());
//!     producer.commit_prev()?;
//! }
//!
//! // Process B: consume
//! let mut consumer = Disruptor::open(DisruptorConfig::new("/prices", 1024, 8, 1))?;
//! let consumed = consumer.consume_new()?;
//! for element in consumed.bufs.elements() {
//!     println!("{:?}", element);
//! }
//! consumer.consume_commit()?;
//! # Ok::<(), shm_disruptor::DisruptorError>(())
//! ```

pub mod config;
pub mod core;
pub mod disruptor;
pub mod error;

pub use crate::config::DisruptorConfig;
pub use crate::core::{Chunks, ChunksMut, HEADER_SIZE};
pub use crate::disruptor::{Claim, Consumed, Disruptor};
pub use crate::error::{DisruptorError, Geometry, Result};
