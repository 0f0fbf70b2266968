//! Core module: Shared-Memory Disruptor Engine
//!
//! Prinsip desain:
//! - Zero-Copy: Claim dan consume mengembalikan view langsung ke mmap region
//! - Lock-Free: Hanya atomic fetch/CAS di header dan tabel consumer, tanpa OS lock
//! - No-Allocation: Segment di-layout sekali saat init, tidak ada alokasi di hot path

mod consumers;
mod ring;
mod segment;
mod spin;

pub(crate) use consumers::{ConsumerTable, Gate};
pub use ring::{Chunks, ChunksMut};
pub(crate) use ring::RingAddress;
pub use segment::HEADER_SIZE;
pub(crate) use segment::Segment;
pub(crate) use spin::{resolve, Attempt, Retry};
