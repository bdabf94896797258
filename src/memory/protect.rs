//! This module makes memory the crate does not own temporarily writable

use region::Protection;

use crate::error::{HookError, Result};

/// Protection that was in place on one run of pages before [`unprotect`]
#[derive(Debug, Clone, Copy)]
struct SavedProtection {
    /// Page aligned start
    address: usize,
    /// Length, a multiple of the page size
    len: usize,
    /// Protection to put back
    protection: Protection,
}

/// Makes `address..address + len` readable, writable and executable.
///
/// Pages are rounded outwards, and every differently protected run of pages is remembered on its
/// own so that [`ProtectionGuard::restore`] puts back exactly what was there.
///
/// # Safety
///
/// Changing the protection of pages other code relies on being read-only is inherently unsafe. The
/// caller must ensure no one else changes the protection of these pages until the guard is restored.
pub unsafe fn unprotect(address: *const u8, len: usize) -> Result<ProtectionGuard> {
    let page_size = region::page::size();
    let start = (address as usize) & !(page_size - 1);
    let end = (address as usize)
        .checked_add(len.max(1))
        .and_then(|end| end.checked_add(page_size - 1))
        .ok_or(HookError::Protection(region::Error::InvalidParameter(
            "range wraps around the address space",
        )))?
        & !(page_size - 1);

    let mut saved = Vec::new();
    for region in region::query_range(start as *const u8, end - start)? {
        let region = region?;
        let range = region.as_range();
        let lower = range.start.max(start);
        let upper = range.end.min(end);
        if lower < upper {
            saved.push(SavedProtection {
                address: lower,
                len: upper - lower,
                protection: region.protection(),
            });
        }
    }

    region::protect(start as *const u8, end - start, Protection::READ_WRITE_EXECUTE)?;
    log::trace!(
        "unprotected {:#x}..{:#x} ({} protection runs saved)",
        start,
        end,
        saved.len()
    );
    Ok(ProtectionGuard {
        saved,
        restored: false,
    })
}

/// Guard for pages made writable by [`unprotect`]
///
/// Call [`ProtectionGuard::restore`] to find out whether putting the protection back worked. If the
/// guard is dropped instead, restoration is attempted and failures are only logged.
#[must_use = "the previous protection is restored when the guard is dropped"]
pub struct ProtectionGuard {
    /// Protection of each run of pages before they were made writable
    saved: Vec<SavedProtection>,
    /// Set once restoration has been attempted
    restored: bool,
}

impl ProtectionGuard {
    /// Puts the previous protection back
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.restore_all()
    }

    /// Reapplies every saved protection, stopping at the first failure
    fn restore_all(&self) -> Result<()> {
        for saved in &self.saved {
            // Safety: these exact pages had this protection before `unprotect`
            unsafe { region::protect(saved.address as *const u8, saved.len, saved.protection)? };
        }
        Ok(())
    }
}

impl Drop for ProtectionGuard {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.restore_all() {
                log::warn!("failed to restore memory protection: {e}");
            }
        }
    }
}
