//! Disruptor Handle: Multi-Producer Multi-Consumer Claim/Commit Protocol
//!
//! Alur data:
//! ```text
//! Producer: claim_* ──> tulis ke ChunksMut ──> commit
//!                                                  │ cursor maju
//! Consumer: consume_new ──> baca Chunks ──> consume_commit
//!                                                  │ posisi consumer maju
//!                                     slot bisa di-claim ulang oleh producer
//! ```
//!
//! Counter shared (`next`, `cursor`, posisi consumer) hanya diubah lewat CAS
//! langsung di mmap region. Semua operasi non-blocking kecuali `spin` aktif.

use crate::config::DisruptorConfig;
use crate::core::{
    resolve, Attempt, Chunks, ChunksMut, ConsumerTable, Gate, Retry, RingAddress, Segment,
};
use crate::error::{DisruptorError, Result};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Hasil claim: view writable ke elemen yang di-reserve
///
/// Jika claim gagal, `bufs` kosong dan `start..=end` adalah range terbalik
/// (`start == end + 1`) yang menunjuk ke akhir claim sebelumnya.
#[derive(Debug)]
pub struct Claim<'a> {
    pub bufs: ChunksMut<'a>,
    /// Sequence elemen pertama (inklusif)
    pub start: u64,
    /// Sequence elemen terakhir (inklusif)
    pub end: u64,
    /// Semua consumer sudah withdraw; producer sebaiknya berhenti
    pub all_consumers_ignoring: bool,
}

impl Claim<'_> {
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Jumlah elemen yang di-claim
    #[inline(always)]
    pub fn count(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }
}

/// Hasil consume: view read-only ke elemen yang sudah di-commit
#[derive(Debug)]
pub struct Consumed<'a> {
    pub bufs: Chunks<'a>,
    /// Jumlah elemen yang sudah di-consume sebelum `bufs`
    pub start: u64,
}

impl Consumed<'_> {
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Exactly(u64),
    UpTo(u64),
}

#[derive(Debug, Clone, Copy)]
struct Grant {
    /// `(start, count)` jika berhasil
    range: Option<(u64, u64)>,
    all_consumers_ignoring: bool,
}

impl Grant {
    const fn denied(all_consumers_ignoring: bool) -> Self {
        Self {
            range: None,
            all_consumers_ignoring,
        }
    }
}

/// Handle ke disruptor di shared memory
///
/// Handle memiliki mapping, bukan memory-nya: segment tetap ada setelah
/// handle di-release atau di-drop. Setiap thread/process yang produce atau
/// consume secara konkuren sebaiknya memakai handle sendiri.
pub struct Disruptor {
    segment: Option<Segment>,
    config: DisruptorConfig,
    ring: RingAddress,
    prev_claim_start: u64,
    prev_claim_end: u64,
    prev_consume_start: u64,
    prev_consume_next: u64,
}

impl std::fmt::Debug for Disruptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("name", &self.config.name)
            .field("consumer", &self.config.consumer)
            .field("spin", &self.config.spin)
            .field("released", &self.segment.is_none())
            .finish()
    }
}

impl Disruptor {
    /// Membuat atau membuka disruptor sesuai `config`
    pub fn open(config: DisruptorConfig) -> Result<Self> {
        let segment = Segment::open(&config)?;
        Ok(Self {
            segment: Some(segment),
            ring: RingAddress::new(config.num_elements, config.element_size),
            config,
            // Range terbalik: belum ada claim
            prev_claim_start: 1,
            prev_claim_end: 0,
            prev_consume_start: 0,
            prev_consume_next: 0,
        })
    }

    /// Shorthand untuk [`Disruptor::open`] dengan semua parameter konstruksi
    pub fn new(
        name: &str,
        num_elements: u32,
        element_size: u32,
        num_consumers: u32,
        consumer: u32,
        init: bool,
        spin: bool,
    ) -> Result<Self> {
        Self::open(
            DisruptorConfig::new(name, num_elements, element_size, num_consumers)
                .consumer(consumer)
                .init(init)
                .spin(spin),
        )
    }

    /// Hapus nama shared memory. Handle yang masih attach tetap bisa
    /// dipakai sampai di-release.
    pub fn destroy(name: &str) -> Result<()> {
        Segment::destroy(name)
    }

    #[inline(always)]
    fn segment(&self) -> Result<&Segment> {
        self.segment.as_ref().ok_or(DisruptorError::Released)
    }

    // ------------------------------------------------------------------
    // Produce: claim
    // ------------------------------------------------------------------

    /// Reserve tepat 1 elemen
    pub fn claim_one(&mut self) -> Result<Claim<'_>> {
        self.claim(Request::Exactly(1))
    }

    /// Reserve tepat `n` elemen, atau tidak sama sekali
    pub fn claim_many(&mut self, n: u64) -> Result<Claim<'_>> {
        self.claim(Request::Exactly(n))
    }

    /// Reserve antara 1 dan `max` elemen, sebanyak yang sedang free
    pub fn claim_avail(&mut self, max: u64) -> Result<Claim<'_>> {
        self.claim(Request::UpTo(max))
    }

    pub async fn claim_one_async(&mut self) -> Result<Claim<'_>> {
        self.claim_async(Request::Exactly(1)).await
    }

    pub async fn claim_many_async(&mut self, n: u64) -> Result<Claim<'_>> {
        self.claim_async(Request::Exactly(n)).await
    }

    pub async fn claim_avail_async(&mut self, max: u64) -> Result<Claim<'_>> {
        self.claim_async(Request::UpTo(max)).await
    }

    fn claim(&mut self, request: Request) -> Result<Claim<'_>> {
        let segment = self.segment()?;
        let grant = resolve(self.config.spin, "claim", || try_claim(segment, request));
        self.finish_claim(grant)
    }

    async fn claim_async(&mut self, request: Request) -> Result<Claim<'_>> {
        let grant = {
            let segment = self.segment()?;
            Retry::new(self.config.spin, "claim", || try_claim(segment, request)).await
        };
        self.finish_claim(grant)
    }

    fn finish_claim(&mut self, grant: Grant) -> Result<Claim<'_>> {
        let Some((start, count)) = grant.range else {
            return Ok(Claim {
                bufs: ChunksMut::default(),
                start: self.prev_claim_end.wrapping_add(1),
                end: self.prev_claim_end,
                all_consumers_ignoring: grant.all_consumers_ignoring,
            });
        };

        let end = start + count - 1;
        self.prev_claim_start = start;
        self.prev_claim_end = end;

        let bufs = self.views_mut(start, end)?;
        Ok(Claim {
            bufs,
            start,
            end,
            all_consumers_ignoring: grant.all_consumers_ignoring,
        })
    }

    // ------------------------------------------------------------------
    // Produce: commit
    // ------------------------------------------------------------------

    /// Publish range `[claim_start, claim_end]` ke consumer.
    ///
    /// Berhasil hanya jika semua range yang di-claim sebelumnya sudah
    /// di-commit (`cursor == claim_start`). Range terbalik selalu `false`.
    /// Range yang belum di-claim (`claim_end >= next`) juga selalu `false`,
    /// supaya `cursor` tidak pernah melewati `next`.
    pub fn commit(&mut self, claim_start: u64, claim_end: u64) -> Result<bool> {
        let segment = self.segment()?;
        Ok(resolve(self.config.spin, "commit", || {
            try_commit(segment, claim_start, claim_end)
        }))
    }

    /// Commit claim terakhir handle ini
    pub fn commit_prev(&mut self) -> Result<bool> {
        self.commit(self.prev_claim_start, self.prev_claim_end)
    }

    pub async fn commit_async(&mut self, claim_start: u64, claim_end: u64) -> Result<bool> {
        let segment = self.segment()?;
        Ok(Retry::new(self.config.spin, "commit", || {
            try_commit(segment, claim_start, claim_end)
        })
        .await)
    }

    pub async fn commit_prev_async(&mut self) -> Result<bool> {
        let (start, end) = (self.prev_claim_start, self.prev_claim_end);
        self.commit_async(start, end).await
    }

    // ------------------------------------------------------------------
    // Consume
    // ------------------------------------------------------------------

    /// Baca semua elemen yang sudah di-commit sejak consume terakhir.
    ///
    /// Memanggil [`Disruptor::consume_commit`] dulu untuk window sebelumnya.
    /// Posisi shared belum maju sampai `consume_commit` berikutnya.
    pub fn consume_new(&mut self) -> Result<Consumed<'_>> {
        self.consume_commit()?;
        let segment = self.segment()?;
        let consumer = self.config.consumer;
        let window = resolve(self.config.spin, "consume", || try_consume(segment, consumer));
        self.finish_consume(window)
    }

    pub async fn consume_new_async(&mut self) -> Result<Consumed<'_>> {
        self.consume_commit()?;
        let window = {
            let segment = self.segment()?;
            let consumer = self.config.consumer;
            Retry::new(self.config.spin, "consume", || try_consume(segment, consumer)).await
        };
        self.finish_consume(window)
    }

    fn finish_consume(&mut self, window: Option<(u64, u64)>) -> Result<Consumed<'_>> {
        let Some((start, next)) = window else {
            return Ok(Consumed {
                bufs: Chunks::default(),
                start: self.prev_consume_next,
            });
        };

        self.prev_consume_start = start;
        self.prev_consume_next = next;

        let bufs = self.views(start, next - 1)?;
        Ok(Consumed { bufs, start })
    }

    /// Tandai window consume terakhir selesai dibaca.
    ///
    /// Return `false` jika posisi shared sudah berubah oleh handle lain yang
    /// memakai consumer ID yang sama (misuse, bukan kondisi retry).
    pub fn consume_commit(&mut self) -> Result<bool> {
        let segment = self.segment()?;
        let (start, next) = (self.prev_consume_start, self.prev_consume_next);
        if start == next {
            return Ok(true);
        }

        let consumer = self.config.consumer;
        let advanced = ConsumerTable::new(segment.consumers()).advance(consumer, start, next);
        if !advanced {
            warn!(
                name = %self.config.name,
                consumer,
                expected = start,
                "consumer position changed underneath this handle; consumer id reused?"
            );
        }

        self.prev_consume_start = next;
        Ok(advanced)
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    /// View ke range yang sudah di-claim tapi belum di-commit, misalnya milik
    /// producer yang crash. Tidak mengubah `next`/`cursor`; panggil
    /// [`Disruptor::commit`] setelahnya untuk membuka pipeline.
    pub fn recover(&mut self, claim_start: u64, claim_end: u64) -> Result<ChunksMut<'_>> {
        let segment = self.segment()?;
        let header = segment.header();
        let cursor = header.cursor.load(Ordering::Acquire);
        let next = header.next.load(Ordering::Acquire);

        if claim_start > claim_end || claim_start < cursor || claim_end >= next {
            return Ok(ChunksMut::default());
        }

        debug!(
            name = %self.config.name,
            claim_start,
            claim_end,
            "recovering outstanding claim"
        );
        self.views_mut(claim_start, claim_end)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Unmap view handle ini. Idempotent.
    ///
    /// Jika `mark_ignoring`, consumer handle ini withdraw dari gating dulu
    /// sehingga producer tidak menunggu consumer ini lagi. Semua view yang
    /// pernah dikembalikan handle ini tidak valid lagi.
    pub fn release(&mut self, mark_ignoring: bool) {
        let Some(segment) = self.segment.take() else {
            return;
        };

        if mark_ignoring {
            ConsumerTable::new(segment.consumers()).mark_ignoring(self.config.consumer);
        }
        debug!(
            name = %self.config.name,
            consumer = self.config.consumer,
            mark_ignoring,
            "released disruptor handle"
        );
    }

    pub fn is_released(&self) -> bool {
        self.segment.is_none()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Jumlah elemen yang pernah di-claim
    pub fn next(&self) -> Result<u64> {
        Ok(self.segment()?.header().next.load(Ordering::Acquire))
    }

    /// Jumlah elemen yang sudah di-commit
    pub fn cursor(&self) -> Result<u64> {
        Ok(self.segment()?.header().cursor.load(Ordering::Acquire))
    }

    /// Posisi consumer `id` (tanpa flag ignoring)
    pub fn consumer_position(&self, id: u32) -> Result<u64> {
        let table = self.table(id)?;
        Ok(table.position(id))
    }

    pub fn consumer_ignoring(&self, id: u32) -> Result<bool> {
        let table = self.table(id)?;
        Ok(table.is_ignoring(id))
    }

    /// Posisi consumer handle ini
    pub fn my_position(&self) -> Result<u64> {
        self.consumer_position(self.config.consumer)
    }

    pub fn all_consumers_ignoring(&self) -> Result<bool> {
        Ok(ConsumerTable::new(self.segment()?.consumers()).all_ignoring())
    }

    /// Snapshot (copy) seluruh element array, untuk debugging dan test.
    ///
    /// Bukan view: handle lain bisa sedang menulis slot yang sedang di-claim,
    /// jadi isi slot tersebut tidak konsisten.
    pub fn elements(&self) -> Result<Vec<u8>> {
        let segment = self.segment()?;
        let len = segment.elements_len();
        let mut out = Vec::with_capacity(len);
        // SAFETY: Range berada di dalam mapping; copy byte mentah tanpa
        // membuat reference ke memory yang bisa di-alias `ChunksMut`.
        unsafe {
            std::ptr::copy_nonoverlapping(segment.elements_ptr(), out.as_mut_ptr(), len);
            out.set_len(len);
        }
        Ok(out)
    }

    fn table(&self, id: u32) -> Result<ConsumerTable<'_>> {
        let table = ConsumerTable::new(self.segment()?.consumers());
        if id as usize >= table.len() {
            return Err(DisruptorError::InvalidConfig(format!(
                "consumer id {} out of range for {} consumers",
                id,
                table.len()
            )));
        }
        Ok(table)
    }

    pub fn prev_claim_start(&self) -> u64 {
        self.prev_claim_start
    }

    pub fn prev_claim_end(&self) -> u64 {
        self.prev_claim_end
    }

    pub fn prev_consume_start(&self) -> u64 {
        self.prev_consume_start
    }

    pub fn prev_consume_next(&self) -> u64 {
        self.prev_consume_next
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn num_elements(&self) -> u32 {
        self.config.num_elements
    }

    pub fn element_size(&self) -> u32 {
        self.config.element_size
    }

    pub fn num_consumers(&self) -> u32 {
        self.config.num_consumers
    }

    pub fn consumer_id(&self) -> u32 {
        self.config.consumer
    }

    pub fn spin(&self) -> bool {
        self.config.spin
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    fn views_mut(&mut self, start: u64, end: u64) -> Result<ChunksMut<'_>> {
        let segment = self.segment()?;
        debug_assert_eq!(segment.geometry(), self.config.geometry());
        // SAFETY: `[start, end]` adalah range yang dimiliki handle ini (claim
        // atau recover) dan view terikat ke `&mut self`.
        Ok(unsafe {
            ChunksMut::from_raw(
                segment.elements_ptr(),
                self.ring.spans(start, end),
                self.config.element_size as usize,
            )
        })
    }

    fn views(&mut self, start: u64, end: u64) -> Result<Chunks<'_>> {
        let segment = self.segment()?;
        // SAFETY: `[start, end]` sudah di-commit dan tidak bisa di-claim ulang
        // sebelum consumer ini commit posisinya.
        Ok(unsafe {
            Chunks::from_raw(
                segment.elements_ptr(),
                self.ring.spans(start, end),
                self.config.element_size as usize,
            )
        })
    }
}

/// Satu percobaan claim: gating lalu CAS `next -> next + count`
fn try_claim(segment: &Segment, request: Request) -> Attempt<Grant> {
    let capacity = segment.geometry().num_elements as u64;
    let header = segment.header();
    let table = ConsumerTable::new(segment.consumers());

    let (min, max) = match request {
        Request::Exactly(n) => (n, n),
        Request::UpTo(n) => (1, n),
    };
    if max == 0 || min > capacity {
        return Attempt::Refused(Grant::denied(table.all_ignoring()));
    }

    loop {
        let next = header.next.load(Ordering::Acquire);
        let slowest = match table.gate() {
            Gate::AllIgnoring => return Attempt::Refused(Grant::denied(true)),
            Gate::Slowest(position) => position,
        };

        // Consumer bisa terlihat lebih maju dari `next` yang stale; CAS di
        // bawah akan gagal dan loop membaca ulang.
        let in_flight = next.saturating_sub(slowest).min(capacity);
        let available = capacity - in_flight;
        if available < min {
            return Attempt::WouldBlock(Grant::denied(false));
        }

        let count = max.min(available);
        if header
            .next
            .compare_exchange_weak(next, next + count, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Attempt::Ready(Grant {
                range: Some((next, count)),
                all_consumers_ignoring: false,
            });
        }
    }
}

/// Satu percobaan commit: CAS `cursor` dari `start` ke `end + 1`
fn try_commit(segment: &Segment, start: u64, end: u64) -> Attempt<bool> {
    if start > end {
        return Attempt::Refused(false);
    }

    let header = segment.header();
    // Range yang belum pernah di-claim tidak boleh dipublish
    if end >= header.next.load(Ordering::Acquire) {
        return Attempt::Refused(false);
    }

    // Release: tulisan producer visible sebelum cursor maju
    match header
        .cursor
        .compare_exchange(start, end + 1, Ordering::AcqRel, Ordering::Acquire)
    {
        Ok(_) => Attempt::Ready(true),
        // Producer dengan claim lebih awal belum commit
        Err(cursor) if cursor < start => Attempt::WouldBlock(false),
        Err(_) => Attempt::Refused(false),
    }
}

/// Satu percobaan consume: window `[position, cursor)`
///
/// Consumer ignoring tidak ikut gating, jadi slot-nya bisa sudah ditimpa
/// producer: tidak ada window untuknya, dan tidak di-retry.
fn try_consume(segment: &Segment, consumer: u32) -> Attempt<Option<(u64, u64)>> {
    let Some(position) = ConsumerTable::new(segment.consumers()).live_position(consumer) else {
        return Attempt::Refused(None);
    };
    let cursor = segment.header().cursor.load(Ordering::Acquire);

    if cursor <= position {
        return Attempt::WouldBlock(None);
    }
    // Window maksimal satu putaran ring
    let capacity = segment.geometry().num_elements as u64;
    Attempt::Ready(Some((position, cursor.min(position + capacity))))
}
