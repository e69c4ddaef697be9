//! Memory-mapped I/O over `/dev/mem`.
//!
//! The accelerator sits behind the HPS-to-FPGA lightweight bridge and
//! shares a DDR3 window with the host; both are plain physical ranges, so
//! access goes through a `/dev/mem` mapping opened with `O_SYNC` (the
//! mapping is non-cacheable on ARM — CPU writes reach the SDRAM controller
//! directly and the FPGA sees them immediately).
//!
//! Unsafe code is confined to this module: mapping, volatile register
//! access, and bulk copies, all bounds-checked before the pointer moves.

use crate::error::{BitnetError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;

const O_SYNC: i32 = 0o10_0000;

/// A mapped physical range with bounds-checked volatile access.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    phys_base: u64,
    label: &'static str,
    _file: File,
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("label", &self.label)
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("size", &self.size)
            .finish()
    }
}

// SAFETY: MappedRegion owns its mapping exclusively; moving it between
// threads does not invalidate the mapping (mmap'd memory is process-wide).
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Map `size` bytes of physical memory starting at `phys_base`.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::DeviceMap`] if `/dev/mem` cannot be opened
    /// (needs root) or the mapping fails.
    pub fn map(phys_base: u64, size: usize, label: &'static str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_SYNC)
            .open("/dev/mem")
            .map_err(|e| {
                BitnetError::device_map(label, format!("open /dev/mem: {e} (run as root?)"))
            })?;

        // SAFETY: fd is valid (just opened), size is the caller's span, and
        // the offset is a physical address — the kernel validates the range.
        // The pointer is either valid for `size` bytes or mmap errors out.
        let ptr = unsafe {
            let addr = mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                phys_base,
            )
            .map_err(|e| BitnetError::device_map(label, format!("mmap {size:#x} bytes: {e}")))?;

            NonNull::new(addr.cast::<u8>())
                .ok_or_else(|| BitnetError::device_map(label, "mmap returned null"))?
        };

        tracing::info!("Mapped {label}: {size:#x} bytes at phys {phys_base:#x}");

        Ok(Self {
            ptr,
            size,
            phys_base,
            label,
            _file: file,
        })
    }

    /// Read a 32-bit register at a byte offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset + 4` exceeds the mapped span.
    pub fn read32(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4)?;
        // SAFETY: bounds validated above; ptr is valid for self.size bytes;
        // registers are 4-byte aligned by the bridge. Volatile is required —
        // hardware changes STATUS/PERF behind the compiler's back.
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };
        Ok(value)
    }

    /// Write a 32-bit register at a byte offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset + 4` exceeds the mapped span.
    pub fn write32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check(offset, 4)?;
        // SAFETY: bounds validated above; volatile is required — register
        // writes have hardware side effects and must not be reordered.
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }
        Ok(())
    }

    /// Copy bytes into the region at a byte offset.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::WeightOverflow`] if the payload does not fit.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if offset.checked_add(data.len()).map_or(true, |end| end > self.size) {
            return Err(BitnetError::WeightOverflow {
                payload: data.len(),
                span: self.size,
                offset,
            });
        }
        // SAFETY: bounds validated above; src is a valid slice; dst is
        // within the mapping; device memory and host buffer cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Physical base address of the mapping.
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    /// Mapped span in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        if offset + len > self.size {
            return Err(BitnetError::device_map(
                self.label,
                format!("offset {offset:#x}+{len} out of bounds (span {:#x})", self.size),
            ));
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/size come from the successful mmap in map(); Drop
        // runs at most once and no references outlive self.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap {} failed: {e}", self.label);
            }
        }
        tracing::debug!("Unmapped {}", self.label);
    }
}
