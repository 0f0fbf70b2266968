//! Retry / spin policy di atas operasi lock-free
//!
//! Setiap operasi inti adalah satu percobaan non-blocking yang menghasilkan
//! [`Attempt`]. Policy spin diterapkan di sini, bukan di operasi itu sendiri:
//! - sync: retry di thread pemanggil dengan backoff (spin lalu yield)
//! - async: future yang wake dirinya sendiri dan return `Pending`, jadi
//!   executor bisa menjalankan task lain di antara percobaan

use crossbeam_utils::Backoff;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// Hasil satu percobaan operasi
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt<T> {
    /// Berhasil
    Ready(T),
    /// Gagal karena kontensi yang bisa selesai sendiri (ring penuh/kosong,
    /// commit out-of-order). Boleh di-retry.
    WouldBlock(T),
    /// Gagal dan retry tidak akan membantu
    Refused(T),
}

impl<T> Attempt<T> {
    #[inline(always)]
    pub(crate) fn into_inner(self) -> T {
        match self {
            Attempt::Ready(v) | Attempt::WouldBlock(v) | Attempt::Refused(v) => v,
        }
    }

    #[inline(always)]
    pub(crate) fn is_would_block(&self) -> bool {
        matches!(self, Attempt::WouldBlock(_))
    }
}

/// Jalankan `op` sekali, atau sampai tidak `WouldBlock` jika `spin`
#[inline]
pub(crate) fn resolve<T>(spin: bool, what: &'static str, mut op: impl FnMut() -> Attempt<T>) -> T {
    let first = op();
    if !spin || !first.is_would_block() {
        return first.into_inner();
    }

    trace!(op = what, "spinning until progress");
    let backoff = Backoff::new();
    loop {
        backoff.snooze();
        let attempt = op();
        if !attempt.is_would_block() {
            return attempt.into_inner();
        }
    }
}

/// Future yang me-reschedule percobaan sampai tidak `WouldBlock`
pub(crate) struct Retry<F> {
    op: F,
    spin: bool,
    what: &'static str,
    attempts: u64,
}

impl<F> Retry<F> {
    pub(crate) fn new(spin: bool, what: &'static str, op: F) -> Self {
        Self {
            op,
            spin,
            what,
            attempts: 0,
        }
    }
}

impl<T, F> Future for Retry<F>
where
    F: FnMut() -> Attempt<T> + Unpin,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = &mut *self;
        let attempt = (this.op)();
        this.attempts += 1;

        if this.spin && attempt.is_would_block() {
            if this.attempts == 1 {
                trace!(op = this.what, "rescheduling until progress");
            }
            // Yield ke executor; poll berikutnya adalah unit kerja baru
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Poll::Ready(attempt.into_inner())
    }
}
