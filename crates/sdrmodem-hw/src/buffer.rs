//! DMA buffer abstraction.
//!
//! The DMA controller moves bytes between the modem IP cores and a physically
//! contiguous memory region reserved in the device tree. Software reaches that
//! region through [`DmaBuffer`], which funnels every access through one bounds
//! check; the backing storage is a [`DmaRegion`]:
//!
//! - [`PhysMapping`]: the reserved region mapped through `/dev/mem`
//! - [`HeapRegion`]: ordinary memory, used by the simulated hardware

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DmaError, Result};

/// Backing storage of a DMA buffer.
///
/// Offsets passed to these methods have already been bounds-checked by
/// [`DmaBuffer`].
pub trait DmaRegion: Send + Sync {
    /// Size of the region in bytes
    fn len(&self) -> usize;

    /// Whether the region is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dest.len()` bytes starting at `offset` out of the region
    fn copy_out(&self, offset: usize, dest: &mut [u8]);

    /// Copy `src` into the region starting at `offset`
    fn copy_in(&self, offset: usize, src: &[u8]);

    /// Set `len` bytes starting at `offset` to `byte`
    fn fill(&self, offset: usize, len: usize, byte: u8);
}

/// Physically contiguous memory mapped through `/dev/mem`
pub struct PhysMapping {
    /// Base of the page-aligned mapping
    map_base: *mut u8,
    /// Length of the page-aligned mapping
    map_len: usize,
    /// Distance from `map_base` to the requested physical address
    delta: usize,
    /// Usable size in bytes
    size: usize,
}

impl PhysMapping {
    /// Default memory device
    pub const DEV_MEM: &'static str = "/dev/mem";

    /// Map `size` bytes of physical memory starting at `phys_addr`
    ///
    /// # Errors
    ///
    /// Returns `DmaError::MapFailed` if `/dev/mem` cannot be opened or the mapping fails.
    pub fn open(phys_addr: u64, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(Self::DEV_MEM)
            .map_err(|e| DmaError::MapFailed(format!("{}: {}", Self::DEV_MEM, e)))?;

        // SAFETY: sysconf is a standard POSIX function with no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = if page_size > 0 { page_size as u64 } else { 4096 };

        let aligned = phys_addr & !(page_size - 1);
        let delta = (phys_addr - aligned) as usize;
        let map_len = size + delta;
        let map_offset = libc::off_t::try_from(aligned).map_err(|_| {
            DmaError::MapFailed(format!("physical address {phys_addr:#x} out of range"))
        })?;

        // SAFETY: mmap is a standard POSIX syscall. The file descriptor is valid for
        // the duration of the call and the offset is page aligned. The result is
        // checked for MAP_FAILED before use; the mapping outlives the descriptor.
        let map_base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                map_offset,
            )
        };

        if map_base == libc::MAP_FAILED {
            return Err(DmaError::MapFailed(io::Error::last_os_error().to_string()));
        }

        debug!(phys_addr, size, map_len, "mapped DMA buffer");

        Ok(Self {
            map_base: map_base as *mut u8,
            map_len,
            delta,
            size,
        })
    }

    fn base(&self) -> *mut u8 {
        // SAFETY: `delta` is smaller than one page and lies inside the mapping.
        unsafe { self.map_base.add(self.delta) }
    }
}

impl DmaRegion for PhysMapping {
    fn len(&self) -> usize {
        self.size
    }

    fn copy_out(&self, offset: usize, dest: &mut [u8]) {
        // SAFETY: The range was bounds-checked against `size` by `DmaBuffer`, and
        // `dest` is a distinct allocation.
        unsafe { ptr::copy_nonoverlapping(self.base().add(offset), dest.as_mut_ptr(), dest.len()) }
    }

    fn copy_in(&self, offset: usize, src: &[u8]) {
        // SAFETY: As in `copy_out`; the mapping is PROT_WRITE.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len()) }
    }

    fn fill(&self, offset: usize, len: usize, byte: u8) {
        // SAFETY: As in `copy_in`.
        unsafe { ptr::write_bytes(self.base().add(offset), byte, len) }
    }
}

impl Drop for PhysMapping {
    fn drop(&mut self) {
        // SAFETY: Unmapping the mmap'd region with its original base and length
        unsafe {
            libc::munmap(self.map_base as *mut libc::c_void, self.map_len);
        }
        debug!(size = self.size, "unmapped DMA buffer");
    }
}

// SAFETY: The mapping is plain memory shared with the DMA controller. Callers
// coordinate which byte ranges each thread touches (the RX worker only writes
// frames the consumer has not yet been told about).
unsafe impl Send for PhysMapping {}
unsafe impl Sync for PhysMapping {}

/// Heap-backed region used by the simulated hardware
pub struct HeapRegion {
    bytes: Mutex<Vec<u8>>,
}

impl HeapRegion {
    /// Zero-filled region of `size` bytes
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size]),
        }
    }
}

impl DmaRegion for HeapRegion {
    fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    fn copy_out(&self, offset: usize, dest: &mut [u8]) {
        let bytes = self.bytes.lock();
        dest.copy_from_slice(&bytes[offset..offset + dest.len()]);
    }

    fn copy_in(&self, offset: usize, src: &[u8]) {
        let mut bytes = self.bytes.lock();
        bytes[offset..offset + src.len()].copy_from_slice(src);
    }

    fn fill(&self, offset: usize, len: usize, byte: u8) {
        let mut bytes = self.bytes.lock();
        bytes[offset..offset + len].fill(byte);
    }
}

/// Bounds-checked view of a DMA buffer.
///
/// Cloning yields another handle to the same region. The region is released
/// once the engine is closed and every handle has been dropped.
#[derive(Clone)]
pub struct DmaBuffer {
    region: Arc<dyn DmaRegion>,
    phys_addr: u64,
}

impl DmaBuffer {
    /// Wrap a region located at physical address `phys_addr`
    pub fn new(region: Arc<dyn DmaRegion>, phys_addr: u64) -> Self {
        Self { region, phys_addr }
    }

    /// Heap-backed buffer of `size` bytes, for simulated hardware
    #[must_use]
    pub fn heap(size: usize, phys_addr: u64) -> Self {
        Self::new(Arc::new(HeapRegion::new(size)), phys_addr)
    }

    /// Buffer size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Physical base address as seen by the DMA controller
    #[must_use]
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Validate that `offset + size` lies inside the buffer
    ///
    /// # Errors
    ///
    /// Returns `DmaError::SizeError` if the range exceeds the buffer.
    pub fn check(&self, offset: usize, size: usize) -> Result<()> {
        let buffer_size = self.len();
        if offset.checked_add(size).is_none_or(|end| end > buffer_size) {
            return Err(DmaError::SizeError {
                offset,
                size,
                buffer_size,
            });
        }
        Ok(())
    }

    /// Copy bytes at `offset` into `dest`
    ///
    /// # Errors
    ///
    /// Returns `DmaError::SizeError` if the range exceeds the buffer.
    pub fn read_at(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        self.check(offset, dest.len())?;
        self.region.copy_out(offset, dest);
        Ok(())
    }

    /// Copy `len` bytes at `offset` into a new vector
    ///
    /// # Errors
    ///
    /// Returns `DmaError::SizeError` if the range exceeds the buffer.
    pub fn read_vec(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0; len];
        self.read_at(offset, &mut out)?;
        Ok(out)
    }

    /// Copy `src` into the buffer at `offset`
    ///
    /// # Errors
    ///
    /// Returns `DmaError::SizeError` if the range exceeds the buffer.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.check(offset, src.len())?;
        self.region.copy_in(offset, src);
        Ok(())
    }

    /// Zero `len` bytes at `offset`
    ///
    /// # Errors
    ///
    /// Returns `DmaError::SizeError` if the range exceeds the buffer.
    pub fn zero(&self, offset: usize, len: usize) -> Result<()> {
        self.check(offset, len)?;
        self.region.fill(offset, len, 0);
        Ok(())
    }

    /// Zero the whole buffer
    pub fn zero_all(&self) {
        self.region.fill(0, self.len(), 0);
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("phys_addr", &format_args!("{:#x}", self.phys_addr))
            .field("len", &self.len())
            .finish()
    }
}
