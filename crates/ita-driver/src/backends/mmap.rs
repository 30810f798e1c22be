//! Memory-mapped physical register range
//!
//! Maps `size` bytes at a physical address from a device file that exposes
//! physical memory (`/dev/mem`, or a UIO node whose offset 0 is the block).
//! The mapping is page-aligned underneath; callers see offsets relative to
//! the requested address.
//!
//! All unsafe code of the MMIO path lives here: one `mmap`, one `munmap`,
//! and the bounds-checked volatile word accesses.

use crate::error::{ItaError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Mapped physical register range
#[derive(Debug)]
pub struct MmapRegion {
    /// Start of the page-aligned mapping
    map_ptr: NonNull<u8>,
    /// Length of the page-aligned mapping
    map_len: usize,
    /// Distance from `map_ptr` to the requested address
    delta: usize,
    /// Usable size from the requested address
    size: usize,
    _file: File,
    path: PathBuf,
    phys_addr: u64,
}

impl MmapRegion {
    /// Map `size` bytes at physical address `phys_addr` through `path`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device file cannot be opened (missing, no permission)
    /// - `size` is 0
    /// - mmap fails
    pub fn new(path: &Path, phys_addr: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ItaError::mapping(path, "zero-sized register range"));
        }

        tracing::debug!("Mapping {size:#x} bytes at {phys_addr:#x} via {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ItaError::mapping(path, format!("cannot open: {e}")))?;

        let page = rustix::param::page_size() as u64;
        let map_offset = phys_addr & !(page - 1);
        #[allow(clippy::cast_possible_truncation)]
        let delta = (phys_addr - map_offset) as usize;
        let map_len = (delta + size).next_multiple_of(page as usize);

        // SAFETY: mmap of a device file; preconditions hold:
        // - fd is valid (just opened, kept alive in `_file` for the mapping's life)
        // - map_len is non-zero and page-rounded, map_offset page-aligned
        // - MAP_SHARED so stores reach the device, no other in-process aliases
        // - the mapping is released exactly once in Drop
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                map_offset,
            )
            .map_err(|e| ItaError::mapping(path, format!("mmap failed: {e}")))?
        };
        let map_ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| ItaError::mapping(path, "mmap returned null"))?;

        tracing::info!(
            "Mapped {phys_addr:#x}..{:#x} at {map_ptr:p}",
            phys_addr + size as u64
        );

        Ok(Self {
            map_ptr,
            map_len,
            delta,
            size,
            _file: file,
            path: path.to_path_buf(),
            phys_addr,
        })
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset % 4 != 0 || offset + 4 > self.size {
            return Err(ItaError::RegisterOutOfBounds {
                offset,
                limit: self.size,
            });
        }
        Ok(())
    }

    /// Volatile read of the 32-bit word at `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the word is misaligned or out of bounds
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;

        // SAFETY: Volatile read from a mapped hardware register.
        // - bounds and 4-byte alignment validated above
        // - map_ptr valid for map_len bytes and delta + offset + 4 <= map_len
        // - volatile keeps the compiler from caching or eliding status polls
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe {
            self.map_ptr
                .as_ptr()
                .add(self.delta + offset)
                .cast::<u32>()
                .read_volatile()
        };

        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Volatile write of the 32-bit word at `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the word is misaligned or out of bounds
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;

        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");

        // SAFETY: Volatile write to a mapped hardware register.
        // - bounds and 4-byte alignment validated above
        // - map_ptr valid for map_len bytes and delta + offset + 4 <= map_len
        // - volatile keeps every store, in program order
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.map_ptr
                .as_ptr()
                .add(self.delta + offset)
                .cast::<u32>()
                .write_volatile(value);
        }

        Ok(())
    }

    /// Usable size in bytes
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Physical address of offset 0
    #[must_use]
    pub const fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Device file the range was mapped from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        tracing::debug!("Unmapping {:#x} ({})", self.phys_addr, self.path.display());

        // SAFETY: map_ptr/map_len are exactly what mmap returned in new();
        // Drop runs once, and no references into the mapping outlive self.
        unsafe {
            if let Err(e) = munmap(self.map_ptr.as_ptr().cast(), self.map_len) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MmapRegion owns its mapping exclusively; moving it between threads
// does not invalidate the mapping, which is process-wide.
unsafe impl Send for MmapRegion {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_file_is_a_mapping_error() {
        let err = MmapRegion::new(Path::new("/nonexistent/ita-mem"), 0x1000, 0x100).unwrap_err();
        assert!(matches!(err, ItaError::Mapping { .. }));
    }

    #[test]
    fn zero_size_rejected_before_open() {
        let err = MmapRegion::new(Path::new("/dev/null"), 0, 0).unwrap_err();
        assert!(matches!(err, ItaError::Mapping { .. }));
    }

    #[test]
    #[ignore] // Requires root and a mapped engine
    fn map_dev_mem() {
        let region = MmapRegion::new(Path::new("/dev/mem"), 0x1000, 0x5C).unwrap();
        assert!(region.read_u32(0x04).is_ok());
        assert!(region.read_u32(0x5C).is_err());
        assert!(region.read_u32(0x02).is_err());
    }
}
