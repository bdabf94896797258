//! # Memory
//!
//! Executable memory owned by the crate, and the raw reads and writes of code owned by someone else.
//!
//! All direct pointer access to process memory happens in this module.

use std::ptr;

use region::Protection;

use crate::error::{HookError, Result};

pub mod cache;
pub mod protect;

pub use cache::flush_instruction_cache;
pub use protect::{unprotect, ProtectionGuard};

/// A page-backed allocation for generated code.
///
/// Writing to the region while it is executable does not make the new bytes visible to the
/// instruction stream; call [`ExecutableMemory::flush_instruction_cache`] before running them.
pub struct ExecutableMemory {
    /// Backing pages, freed when dropped
    allocation: region::Allocation,
    /// Requested size. The allocation itself is rounded up to whole pages
    len: usize,
    /// Protection currently applied to the pages
    protection: Protection,
    /// Protection replaced by the last [`ExecutableMemory::set_protection`]
    previous: Option<Protection>,
}

impl ExecutableMemory {
    /// Allocates `size` bytes with the given protection
    pub fn allocate(size: usize, protection: Protection) -> Result<Self> {
        if size == 0 {
            return Err(HookError::Allocation(region::Error::InvalidParameter(
                "size must be greater than zero",
            )));
        }
        let allocation = region::alloc(size, protection).map_err(HookError::Allocation)?;
        log::trace!(
            "allocated {} bytes at {:#x} ({:?})",
            size,
            allocation.as_ptr::<u8>() as usize,
            protection
        );
        Ok(Self {
            allocation,
            len: size,
            protection,
            previous: None,
        })
    }

    /// Start of the region
    pub fn as_ptr(&self) -> *const u8 {
        self.allocation.as_ptr()
    }

    /// Start of the region as an integer
    pub fn address(&self) -> usize {
        self.as_ptr() as usize
    }

    /// Size that was requested when allocating
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, empty regions can't be allocated
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Protection currently applied to the region
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Checks that `offset..offset + len` lies in the region
    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(HookError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    /// Copies `len` bytes starting at `offset` out of the region
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_bounds(offset, len)?;
        if !self.protection.contains(Protection::READ) {
            return Err(HookError::Read {
                address: self.address() + offset,
                len,
            });
        }
        let mut out = vec![0u8; len];
        // Safety: bounds checked above and the pages are readable
        unsafe { ptr::copy_nonoverlapping(self.as_ptr().add(offset), out.as_mut_ptr(), len) };
        Ok(out)
    }

    /// Writes `bytes` at the start of the region
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_at(0, bytes)
    }

    /// Writes `bytes` starting at `offset`
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_bounds(offset, bytes.len())?;
        if !self.protection.contains(Protection::WRITE) {
            return Err(HookError::Write {
                address: self.address() + offset,
                len: bytes.len(),
            });
        }
        // Safety: bounds checked above and the pages are writable
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.allocation.as_mut_ptr::<u8>().add(offset),
                bytes.len(),
            )
        };
        Ok(())
    }

    /// Changes the protection of the region, returning the one it replaced.
    ///
    /// The replaced protection is remembered for [`ExecutableMemory::restore_previous_protection`].
    pub fn set_protection(&mut self, protection: Protection) -> Result<Protection> {
        // Safety: the pages belong to this allocation and nothing else holds references into them
        unsafe { region::protect(self.as_ptr(), self.len, protection)? };
        let previous = self.protection;
        self.protection = protection;
        self.previous = Some(previous);
        Ok(previous)
    }

    /// Goes back to the protection in place before the last [`ExecutableMemory::set_protection`].
    ///
    /// Does nothing if the protection was never changed.
    pub fn restore_previous_protection(&mut self) -> Result<()> {
        if let Some(previous) = self.previous.take() {
            // Safety: see `set_protection`
            unsafe { region::protect(self.as_ptr(), self.len, previous)? };
            self.protection = previous;
        }
        Ok(())
    }

    /// Makes freshly written code visible to instruction fetch
    pub fn flush_instruction_cache(&self) -> Result<()> {
        flush_instruction_cache(self.as_ptr(), self.len)
    }

    /// Returns the region to the OS
    pub fn release(self) {
        log::trace!("releasing {} bytes at {:#x}", self.len, self.address());
        drop(self);
    }
}

/// Fails with [`HookError::Read`] unless every byte of `address..address + len` is mapped and readable
pub fn ensure_readable(address: *const u8, len: usize) -> Result<()> {
    let start = address as usize;
    let read_error = || HookError::Read {
        address: start,
        len,
    };
    if len == 0 {
        return Ok(());
    }
    let end = start.checked_add(len).ok_or_else(read_error)?;
    let regions = region::query_range(address, len).map_err(|_| read_error())?;

    // regions come back in ascending order, any gap between them is unmapped
    let mut covered = start;
    for region in regions {
        let region = region.map_err(|_| read_error())?;
        let range = region.as_range();
        if range.start > covered
            || region.is_guarded()
            || !region.protection().contains(Protection::READ)
        {
            return Err(read_error());
        }
        covered = covered.max(range.end);
        if covered >= end {
            return Ok(());
        }
    }
    if covered >= end {
        Ok(())
    } else {
        Err(read_error())
    }
}

/// Copies `len` bytes of someone else's memory
///
/// # Safety
///
/// Nothing may be writing to the range concurrently
pub unsafe fn read_target(address: *const u8, len: usize) -> Result<Vec<u8>> {
    ensure_readable(address, len)?;
    let mut out = vec![0u8; len];
    ptr::copy_nonoverlapping(address, out.as_mut_ptr(), len);
    Ok(out)
}

/// Copies `bytes` over someone else's memory
///
/// # Safety
///
/// `address` must be writable for `bytes.len()` bytes, see [`unprotect`]
pub(crate) unsafe fn write_target(address: *mut u8, bytes: &[u8]) {
    ptr::copy_nonoverlapping(bytes.as_ptr(), address, bytes.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Writing then reading gives back the same data
    fn test_read_write() {
        let mut mem = ExecutableMemory::allocate(64, Protection::READ_WRITE_EXECUTE).unwrap();
        let data = b"Hello, jmphook";
        mem.write(data).unwrap();
        assert_eq!(mem.read(0, data.len()).unwrap(), data);

        mem.write_at(60, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mem.read(58, 6).unwrap()[2..], [1, 2, 3, 4]);
        mem.release();
    }

    #[test]
    /// Accesses past the requested size are rejected even though the page is larger
    fn test_out_of_bounds() {
        let mut mem = ExecutableMemory::allocate(16, Protection::READ_WRITE).unwrap();
        assert!(matches!(
            mem.write_at(10, &[0; 7]),
            Err(HookError::OutOfBounds {
                offset: 10,
                len: 7,
                size: 16
            })
        ));
        assert!(matches!(mem.read(17, 0), Err(HookError::OutOfBounds { .. })));
        assert!(matches!(
            mem.read(usize::MAX, 2),
            Err(HookError::OutOfBounds { .. })
        ));
        assert_eq!(mem.read(16, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    /// Zero sized regions can't be allocated
    fn test_allocate_empty() {
        assert!(matches!(
            ExecutableMemory::allocate(0, Protection::READ_WRITE_EXECUTE),
            Err(HookError::Allocation(_))
        ));
    }

    #[test]
    /// Protection changes are applied, remembered and undone
    fn test_protection() {
        let mut mem = ExecutableMemory::allocate(32, Protection::READ_WRITE).unwrap();
        mem.write(&[0xC3; 32]).unwrap();

        let previous = mem.set_protection(Protection::READ_EXECUTE).unwrap();
        assert_eq!(previous, Protection::READ_WRITE);
        assert_eq!(mem.protection(), Protection::READ_EXECUTE);
        let region = region::query(mem.as_ptr()).unwrap();
        assert_eq!(region.protection(), Protection::READ_EXECUTE);

        // no longer writable
        assert!(matches!(mem.write(&[0x90]), Err(HookError::Write { .. })));
        assert_eq!(mem.read(0, 2).unwrap(), [0xC3, 0xC3]);

        mem.restore_previous_protection().unwrap();
        assert_eq!(mem.protection(), Protection::READ_WRITE);
        let region = region::query(mem.as_ptr()).unwrap();
        assert_eq!(region.protection(), Protection::READ_WRITE);
        mem.write(&[0x90]).unwrap();
    }

    #[test]
    /// Memory we own is readable, unmapped memory is not
    fn test_ensure_readable() {
        let mem = ExecutableMemory::allocate(16, Protection::READ_WRITE).unwrap();
        ensure_readable(mem.as_ptr(), 16).unwrap();
        assert!(matches!(
            ensure_readable(ptr::null(), 16),
            Err(HookError::Read { .. })
        ));
    }

    #[test]
    /// Reads of foreign memory go through the readability check
    fn test_read_target() {
        let data = [1u8, 2, 3, 4, 5];
        let bytes = unsafe { read_target(data.as_ptr(), data.len()).unwrap() };
        assert_eq!(bytes, data);
    }
}
