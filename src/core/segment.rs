//! Named Shared Memory Segment untuk Zero-Copy IPC
//!
//! Layout segment (semua offset tetap, dihitung dari parameter konstruksi):
//! ┌─────────────────────────────────────────────────────┐
//! │ ControlHeader (192 bytes)                           │
//! │   meta   : magic, version, geometry   (cache line)  │
//! │   next   : AtomicU64                  (cache line)  │
//! │   cursor : AtomicU64                  (cache line)  │
//! ├─────────────────────────────────────────────────────┤
//! │ Consumer table: num_consumers x AtomicU64           │
//! ├─────────────────────────────────────────────────────┤
//! │ Elements: num_elements x element_size bytes         │
//! └─────────────────────────────────────────────────────┘
//!
//! Segment di-mmap langsung dari object `shm_open`, jadi setiap process yang
//! attach melihat memory fisik yang sama. Handle hanya memiliki mapping-nya
//! sendiri; object shared memory tetap ada sampai [`Segment::destroy`].

use crate::config::DisruptorConfig;
use crate::error::{DisruptorError, Geometry, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::debug;

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
pub(crate) struct CacheLinePadded<T> {
    value: T,
}

impl<T> std::ops::Deref for CacheLinePadded<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.value
    }
}

#[repr(C, align(64))]
struct SegmentMeta {
    magic: AtomicU64,
    version: AtomicU32,
    num_elements: AtomicU32,
    element_size: AtomicU32,
    num_consumers: AtomicU32,
}

/// Header kontrol yang di-share antar process
///
/// `next` dan `cursor` berada di cache line terpisah supaya producer yang
/// claim tidak invalidasi cache line consumer yang polling cursor.
#[repr(C)]
pub(crate) struct ControlHeader {
    meta: SegmentMeta,
    /// Jumlah elemen yang pernah di-claim
    pub(crate) next: CacheLinePadded<AtomicU64>,
    /// Jumlah elemen yang sudah di-commit dan visible
    pub(crate) cursor: CacheLinePadded<AtomicU64>,
}

const MAGIC: u64 = 0x5348_4D44_5253_5550; // "SHMDRSUP"
const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = std::mem::size_of::<ControlHeader>();
const CONSUMER_ENTRY_SIZE: usize = std::mem::size_of::<AtomicU64>();
const NAME_MAX: usize = 255;

/// Mapping satu handle ke segment
pub(crate) struct Segment {
    mmap: MmapMut,
    base: NonNull<u8>,
    name: String,
    geometry: Geometry,
}

// SAFETY: Semua state shared diakses lewat atomics atau lewat range yang
// ownership-nya diatur oleh protokol claim/commit.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Membuat (`init == true`) atau membuka segment
    pub(crate) fn open(config: &DisruptorConfig) -> Result<Self> {
        config.validate()?;
        validate_name(&config.name)?;

        let size = config
            .segment_size()
            .ok_or_else(|| DisruptorError::InvalidConfig("segment size overflows usize".into()))?;
        let name = config.name.as_str();
        let file = shm_open(name, config.init)?;

        if config.init {
            // ftruncate setelah O_TRUNC: seluruh segment berisi null bytes
            file.set_len(size as u64)
                .map_err(|e| DisruptorError::shm("ftruncate", name, e))?;
        } else {
            let actual = file
                .metadata()
                .map_err(|e| DisruptorError::shm("fstat", name, e))?
                .len();
            if actual < size as u64 {
                return Err(DisruptorError::SizeMismatch {
                    name: name.to_string(),
                    expected: size,
                    actual,
                });
            }
        }

        // SAFETY: Object dibuka read/write dan ukurannya sudah dicek >= size.
        // Konten bisa berubah oleh process lain; semua akses lewat atomics
        // atau range yang dimiliki oleh claim.
        let mut mmap = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(|e| DisruptorError::shm("mmap", name, e))?;

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| DisruptorError::shm("mmap", name, std::io::ErrorKind::Other.into()))?;

        let segment = Self {
            mmap,
            base,
            name: name.to_string(),
            geometry: config.geometry(),
        };

        if config.init {
            segment.write_meta();
            debug!(name, size, geometry = %segment.geometry, "created shared memory segment");
        } else {
            segment.check_meta()?;
            debug!(name, size, geometry = %segment.geometry, "opened shared memory segment");
        }

        Ok(segment)
    }

    /// Hapus nama shared memory (operator-level). Mapping yang masih aktif
    /// tetap valid sampai di-release.
    pub(crate) fn destroy(name: &str) -> Result<()> {
        validate_name(name)?;
        shm_unlink(name)?;
        debug!(name, "destroyed shared memory segment");
        Ok(())
    }

    fn write_meta(&self) {
        let meta = &self.header().meta;
        meta.version.store(VERSION, Ordering::Relaxed);
        meta.num_elements
            .store(self.geometry.num_elements, Ordering::Relaxed);
        meta.element_size
            .store(self.geometry.element_size, Ordering::Relaxed);
        meta.num_consumers
            .store(self.geometry.num_consumers, Ordering::Relaxed);
        // Release: geometry visible sebelum magic
        meta.magic.store(MAGIC, Ordering::Release);
    }

    fn check_meta(&self) -> Result<()> {
        let meta = &self.header().meta;
        if meta.magic.load(Ordering::Acquire) != MAGIC
            || meta.version.load(Ordering::Relaxed) != VERSION
        {
            return Err(DisruptorError::NotInitialized {
                name: self.name.clone(),
            });
        }

        let actual = Geometry {
            num_elements: meta.num_elements.load(Ordering::Relaxed),
            element_size: meta.element_size.load(Ordering::Relaxed),
            num_consumers: meta.num_consumers.load(Ordering::Relaxed),
        };
        if actual != self.geometry {
            return Err(DisruptorError::GeometryMismatch {
                name: self.name.clone(),
                expected: self.geometry,
                actual,
            });
        }
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn header(&self) -> &ControlHeader {
        // SAFETY: Header berada di awal mapping yang page-aligned
        unsafe { &*(self.base.as_ptr() as *const ControlHeader) }
    }

    /// Tabel posisi consumer, satu `AtomicU64` per consumer
    #[inline(always)]
    pub(crate) fn consumers(&self) -> &[AtomicU64] {
        // SAFETY: HEADER_SIZE kelipatan 64, jadi entry 8-byte aligned.
        // AtomicU64 punya layout yang sama dengan u64.
        unsafe {
            std::slice::from_raw_parts(
                self.base.as_ptr().add(HEADER_SIZE) as *const AtomicU64,
                self.geometry.num_consumers as usize,
            )
        }
    }

    /// Pointer ke elemen pertama
    #[inline(always)]
    pub(crate) fn elements_ptr(&self) -> *mut u8 {
        let offset = HEADER_SIZE + self.geometry.num_consumers as usize * CONSUMER_ENTRY_SIZE;
        // SAFETY: offset <= ukuran mapping (dicek saat open)
        unsafe { self.base.as_ptr().add(offset) }
    }

    #[inline(always)]
    pub(crate) fn elements_len(&self) -> usize {
        self.geometry.num_elements as usize * self.geometry.element_size as usize
    }

    #[inline(always)]
    pub(crate) fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.mmap.len()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        debug!(name = %self.name, len = self.mmap.len(), "unmapping shared memory segment");
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| DisruptorError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if !name.starts_with('/') {
        return Err(invalid("must start with `/`"));
    }
    if name.len() < 2 {
        return Err(invalid("must have at least one character after `/`"));
    }
    if name.len() > NAME_MAX {
        return Err(invalid("longer than 255 bytes"));
    }
    if name[1..].contains('/') {
        return Err(invalid("must not contain `/` after the first character"));
    }
    if name.contains('\0') {
        return Err(invalid("must not contain NUL bytes"));
    }
    Ok(())
}

#[cfg(unix)]
fn shm_open(name: &str, init: bool) -> Result<File> {
    use std::ffi::CString;
    use std::os::unix::io::FromRawFd;

    let c_name = CString::new(name).map_err(|_| DisruptorError::InvalidName {
        name: name.to_string(),
        reason: "must not contain NUL bytes",
    })?;

    let flags = if init {
        libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC
    } else {
        libc::O_RDWR
    };
    let mode = (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint;

    // SAFETY: c_name adalah C string yang valid selama pemanggilan
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, mode) };
    if fd < 0 {
        return Err(DisruptorError::shm(
            "shm_open",
            name,
            std::io::Error::last_os_error(),
        ));
    }

    // SAFETY: fd baru saja dibuka dan dimiliki sepenuhnya oleh File ini
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(unix)]
fn shm_unlink(name: &str) -> Result<()> {
    use std::ffi::CString;

    let c_name = CString::new(name).map_err(|_| DisruptorError::InvalidName {
        name: name.to_string(),
        reason: "must not contain NUL bytes",
    })?;

    // SAFETY: c_name adalah C string yang valid selama pemanggilan
    if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
        return Err(DisruptorError::shm(
            "shm_unlink",
            name,
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn shm_open(_name: &str, _init: bool) -> Result<File> {
    Err(DisruptorError::Unsupported)
}

#[cfg(not(unix))]
fn shm_unlink(_name: &str) -> Result<()> {
    Err(DisruptorError::Unsupported)
}
