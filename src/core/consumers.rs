//! Tabel posisi consumer
//!
//! Satu `AtomicU64` per consumer. Bit 63 adalah flag "ignoring" (consumer
//! sudah withdraw dan tidak ikut gating lagi), bit 0..62 adalah jumlah elemen
//! yang sudah di-consume dan di-commit oleh consumer tersebut.
//!
//! Entry hanya ditulis oleh consumer pemilik ID-nya; semua producer membaca
//! seluruh tabel untuk gating.

use std::sync::atomic::{AtomicU64, Ordering};

/// Flag consumer yang sudah withdraw dari gating
pub(crate) const IGNORING: u64 = 1 << 63;
const POSITION_MASK: u64 = !IGNORING;

/// Hasil gating terhadap semua consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    /// Semua consumer ignoring: producer harus berhenti
    AllIgnoring,
    /// Posisi consumer non-ignoring paling lambat
    Slowest(u64),
}

#[derive(Clone, Copy)]
pub(crate) struct ConsumerTable<'a> {
    entries: &'a [AtomicU64],
}

impl<'a> ConsumerTable<'a> {
    #[inline(always)]
    pub(crate) fn new(entries: &'a [AtomicU64]) -> Self {
        Self { entries }
    }

    /// Posisi minimum dari semua consumer non-ignoring
    #[inline]
    pub(crate) fn gate(&self) -> Gate {
        let mut slowest: Option<u64> = None;
        for entry in self.entries {
            let raw = entry.load(Ordering::Acquire);
            if raw & IGNORING != 0 {
                continue;
            }
            slowest = Some(slowest.map_or(raw, |s| s.min(raw)));
        }
        slowest.map_or(Gate::AllIgnoring, Gate::Slowest)
    }

    #[inline(always)]
    pub(crate) fn position(&self, id: u32) -> u64 {
        self.entries[id as usize].load(Ordering::Acquire) & POSITION_MASK
    }

    /// Posisi consumer `id`, atau `None` jika sudah ignoring (satu load)
    #[inline(always)]
    pub(crate) fn live_position(&self, id: u32) -> Option<u64> {
        let raw = self.entries[id as usize].load(Ordering::Acquire);
        (raw & IGNORING == 0).then_some(raw)
    }

    #[inline(always)]
    pub(crate) fn is_ignoring(&self, id: u32) -> bool {
        self.entries[id as usize].load(Ordering::Acquire) & IGNORING != 0
    }

    #[inline]
    pub(crate) fn all_ignoring(&self) -> bool {
        self.gate() == Gate::AllIgnoring
    }

    /// CAS posisi consumer dari `from` ke `to`.
    ///
    /// Gagal berarti handle lain dengan ID yang sama sudah memajukan posisi
    /// (atau menandai ignoring).
    #[inline]
    pub(crate) fn advance(&self, id: u32, from: u64, to: u64) -> bool {
        self.entries[id as usize]
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_ignoring(&self, id: u32) {
        self.entries[id as usize].fetch_or(IGNORING, Ordering::AcqRel);
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
