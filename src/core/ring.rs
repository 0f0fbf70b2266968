//! Ring addressing: sequence logis -> byte range fisik
//!
//! Sequence `s` berada di slot `s % num_elements`. Range yang melewati akhir
//! array dipecah menjadi dua chunk: ekor array lalu kepala array. Claim dan
//! consume tidak pernah lebih dari `num_elements`, jadi maksimal dua chunk.

use std::ops::Range;

/// Addressing untuk satu geometry ring
#[derive(Debug, Clone, Copy)]
pub(crate) struct RingAddress {
    num_elements: u64,
    element_size: usize,
}

impl RingAddress {
    pub(crate) fn new(num_elements: u32, element_size: u32) -> Self {
        Self {
            num_elements: num_elements as u64,
            element_size: element_size as usize,
        }
    }

    /// Byte range untuk sequence inklusif `[start, end]`.
    ///
    /// Chunk kedua kosong jika range tidak wrap.
    ///
    /// # Panics
    /// Jika range terbalik atau lebih dari `num_elements` elemen: view seperti
    /// itu akan keluar dari element array.
    #[inline]
    pub(crate) fn spans(&self, start: u64, end: u64) -> (Range<usize>, Range<usize>) {
        assert!(
            start <= end && end - start < self.num_elements,
            "range [{start}, {end}] does not fit a ring of {} elements",
            self.num_elements
        );
        let count = end - start + 1;

        let slot = start % self.num_elements;
        let first = count.min(self.num_elements - slot);
        let second = count - first;

        let head_start = slot as usize * self.element_size;
        let head = head_start..head_start + first as usize * self.element_size;
        let tail = 0..second as usize * self.element_size;
        (head, tail)
    }
}

/// View read-only ke satu atau dua chunk elemen di shared memory
#[derive(Debug, Default)]
pub struct Chunks<'a> {
    head: &'a [u8],
    tail: &'a [u8],
    element_size: usize,
}

/// View writable ke satu atau dua chunk elemen di shared memory
#[derive(Debug, Default)]
pub struct ChunksMut<'a> {
    head: &'a mut [u8],
    tail: &'a mut [u8],
    element_size: usize,
}

impl<'a> Chunks<'a> {
    /// # Safety
    /// `base` harus valid untuk `head` dan `tail` selama `'a`, dan tidak ada
    /// writer lain ke range tersebut selama `'a`.
    pub(crate) unsafe fn from_raw(
        base: *const u8,
        (head, tail): (Range<usize>, Range<usize>),
        element_size: usize,
    ) -> Self {
        Self {
            head: std::slice::from_raw_parts(base.add(head.start), head.len()),
            tail: std::slice::from_raw_parts(base.add(tail.start), tail.len()),
            element_size,
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    /// Jumlah chunk non-kosong (0, 1, atau 2)
    #[inline(always)]
    pub fn len(&self) -> usize {
        usize::from(!self.head.is_empty()) + usize::from(!self.tail.is_empty())
    }

    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.iter().nth(index)
    }

    /// Iterasi chunk non-kosong, urut sesuai sequence
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        [self.head, self.tail].into_iter().filter(|c| !c.is_empty())
    }

    /// Iterasi per elemen melewati batas wrap
    pub fn elements(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let size = self.element_size.max(1);
        self.iter().flat_map(move |c| c.chunks_exact(size))
    }

    /// Total bytes semua chunk
    #[inline(always)]
    pub fn total_len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    /// Jumlah elemen di semua chunk
    #[inline(always)]
    pub fn num_elements(&self) -> usize {
        self.total_len().checked_div(self.element_size).unwrap_or(0)
    }

    /// Copy semua chunk ke satu Vec (keluar dari zero-copy path)
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(self.head);
        out.extend_from_slice(self.tail);
        out
    }
}

impl<'a> ChunksMut<'a> {
    /// # Safety
    /// `base` harus valid untuk `head` dan `tail` selama `'a`, dan caller
    /// harus memegang ownership eksklusif range tersebut selama `'a`.
    pub(crate) unsafe fn from_raw(
        base: *mut u8,
        (head, tail): (Range<usize>, Range<usize>),
        element_size: usize,
    ) -> Self {
        Self {
            head: std::slice::from_raw_parts_mut(base.add(head.start), head.len()),
            tail: std::slice::from_raw_parts_mut(base.add(tail.start), tail.len()),
            element_size,
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    /// Jumlah chunk non-kosong (0, 1, atau 2)
    #[inline(always)]
    pub fn len(&self) -> usize {
        usize::from(!self.head.is_empty()) + usize::from(!self.tail.is_empty())
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        [&*self.head, &*self.tail]
            .into_iter()
            .filter(|c| !c.is_empty())
            .nth(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.iter_mut().nth(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        [&mut *self.head, &mut *self.tail]
            .into_iter()
            .filter(|c| !c.is_empty())
    }

    /// Iterasi writable per elemen melewati batas wrap
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        let size = self.element_size.max(1);
        self.iter_mut().flat_map(move |c| c.chunks_exact_mut(size))
    }

    #[inline(always)]
    pub fn total_len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    #[inline(always)]
    pub fn num_elements(&self) -> usize {
        self.total_len().checked_div(self.element_size).unwrap_or(0)
    }

    /// Tulis `data` ke chunk secara berurutan (handle wraparound).
    ///
    /// # Panics
    /// Panic jika `data.len() != total_len()`
    pub fn copy_from_slice(&mut self, data: &[u8]) {
        assert_eq!(
            data.len(),
            self.total_len(),
            "source length must match claimed bytes"
        );
        let (first, second) = data.split_at(self.head.len());
        self.head.copy_from_slice(first);
        self.tail.copy_from_slice(second);
    }

    pub fn fill(&mut self, value: u8) {
        self.head.fill(value);
        self.tail.fill(value);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(self.head);
        out.extend_from_slice(self.tail);
        out
    }
}
