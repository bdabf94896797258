//! # Jump Hook
//!
//! This hook type overwrites the start of a function with a `jmp` to the replacement

use std::mem;

use super::{HookContext, HookState};
use crate::code::{self, listing};
use crate::error::{HookError, Result};
use crate::memory::{self, ExecutableMemory, ProtectionGuard};
use crate::trampoline;

/// Last step of every write to a target: protection goes back, then the cache is flushed
type Finish = dyn Fn(ProtectionGuard, *const u8, usize) -> Result<()>;

/// Restores the protection of `len` patched bytes at `target` and flushes them
fn finish_write(guard: ProtectionGuard, target: *const u8, len: usize) -> Result<()> {
    guard.restore()?;
    memory::flush_instruction_cache(target, len)
}

/// An installed jump hook.
///
/// While installed, calls to the target land in the replacement, and [`JmpHook::original`] points
/// at a trampoline that behaves like the unhooked target. Dropping an installed hook closes it.
pub struct JmpHook {
    /// Function that was patched
    target: *const u8,
    /// Function the target now jumps to
    replacement: *const u8,
    /// Displaced prologue plus the jump back. Its first `patch_size` bytes are the original bytes of
    /// the target, which is what [`JmpHook::close`] writes back
    trampoline: Option<ExecutableMemory>,
    /// Number of bytes of the target that were displaced
    patch_size: usize,
    /// Where the hook is in its lifecycle
    state: HookState,
}

impl JmpHook {
    /// Redirects `target` to `replacement`.
    ///
    /// The first instructions of `target` covering the jump must not be branches, calls or
    /// IP-relative accesses, as they are moved into the trampoline unchanged.
    ///
    /// If something fails after the jump was written, the original bytes are put back before the
    /// error is returned. When that fails too the error is [`HookError::CorruptedTarget`].
    ///
    /// # Safety
    ///
    /// - `target` must be the start of a function of the context's architecture, with at least as
    ///   many bytes of code as the patch needs
    /// - `replacement` must be a function with the same calling convention
    /// - no other thread may run the first bytes of `target` or hook it while this runs
    pub unsafe fn install(
        context: &HookContext,
        target: *const u8,
        replacement: *const u8,
    ) -> Result<Self> {
        Self::install_with(context, target, replacement, &finish_write)
    }

    /// [`JmpHook::install`] with the step run after every write to the target
    ///
    /// # Safety
    ///
    /// See [`JmpHook::install`]
    unsafe fn install_with(
        context: &HookContext,
        target: *const u8,
        replacement: *const u8,
        finish: &Finish,
    ) -> Result<Self> {
        let arch = context.arch();
        let address = target as usize;
        let required = arch.jump_size(address, replacement as usize);
        log::debug!(
            "hooking {:#x} -> {:#x} on {} ({} byte jump)",
            address,
            replacement as usize,
            arch.name(),
            required
        );

        let prologue = memory::read_target(target, context.lookahead(required))?;
        let instructions = code::scan_prefix(arch.bitness(), &prologue, address as u64, required)?;
        let patch_size = code::compute_patch_size(instructions, required)?;
        log::trace!(
            "displacing {} bytes of {:#x}:\n{}",
            patch_size,
            address,
            listing::format_code(arch.bitness(), &prologue[..patch_size], address as u64)
        );

        let trampoline = trampoline::build(arch, &prologue, patch_size, address)?;
        trampoline.flush_instruction_cache()?;
        log::trace!(
            "trampoline at {:#x}:\n{}",
            trampoline.address(),
            listing::format_code(
                arch.bitness(),
                &trampoline.read(0, trampoline.len())?,
                trampoline.address() as u64
            )
        );

        let jmp = arch.new_jump_asm(address, replacement as usize);
        let guard = memory::unprotect(target, jmp.len())?;
        memory::write_target(target as *mut u8, &jmp);

        let mut hook = Self {
            target,
            replacement,
            trampoline: Some(trampoline),
            patch_size,
            state: HookState::Installed,
        };

        if let Err(e) = finish(guard, target, patch_size) {
            log::warn!("failed to finish hooking {:#x}, unhooking: {}", address, e);
            return Err(match hook.close_with(finish) {
                Ok(()) => e,
                Err(failed) => hook.abandon(failed),
            });
        }

        log::debug!(
            "hooked {:#x}, trampoline at {:#x}",
            address,
            hook.trampoline
                .as_ref()
                .map_or(0, ExecutableMemory::address)
        );
        Ok(hook)
    }

    /// Gives the target its original bytes back and frees the trampoline.
    ///
    /// Closing twice returns [`HookError::AlreadyClosed`] without touching the target.
    ///
    /// If the original bytes could not be read from the trampoline or the target could not be made
    /// writable, nothing was changed: the error is returned and the hook stays installed. Any failure
    /// after that returns [`HookError::CorruptedTarget`]; the hook is then closed, and its trampoline
    /// leaked since the target may still lead into it. The target should not be run again.
    pub fn close(&mut self) -> Result<()> {
        self.close_with(&finish_write)
    }

    /// [`JmpHook::close`] with the step run after writing the target
    fn close_with(&mut self, finish: &Finish) -> Result<()> {
        let trampoline = match (&self.state, &self.trampoline) {
            (HookState::Installed, Some(trampoline)) => trampoline,
            _ => return Err(HookError::AlreadyClosed),
        };
        let original = trampoline.read(0, self.patch_size)?;

        // Safety: `target` was writable for this range when the hook was installed
        let guard = unsafe { memory::unprotect(self.target, original.len())? };
        self.state = HookState::Closed;
        unsafe { memory::write_target(self.target as *mut u8, &original) };

        match finish(guard, self.target, original.len()) {
            Ok(()) => {
                if let Some(trampoline) = self.trampoline.take() {
                    trampoline.release();
                }
                log::debug!("unhooked {:#x}", self.target as usize);
                Ok(())
            }
            Err(source) => Err(self.abandon(source)),
        }
    }

    /// Gives up on a target that could not be restored.
    ///
    /// The hook is closed without touching the target again and its trampoline is leaked, since
    /// the target may still lead into it.
    fn abandon(&mut self, error: HookError) -> HookError {
        self.state = HookState::Closed;
        mem::forget(self.trampoline.take());
        match error {
            HookError::CorruptedTarget { .. } => error,
            source => HookError::CorruptedTarget {
                address: self.target as usize,
                source: Box::new(source),
            },
        }
    }

    /// Returns a pointer that behaves like the unhooked target.
    ///
    /// The pointer dangles once the hook is closed.
    pub fn original(&self) -> Result<*const u8> {
        match (&self.state, &self.trampoline) {
            (HookState::Installed, Some(trampoline)) => Ok(trampoline.as_ptr()),
            _ => Err(HookError::AlreadyClosed),
        }
    }

    /// Function that was hooked
    pub fn target(&self) -> *const u8 {
        self.target
    }

    /// Function calls are redirected to
    pub fn replacement(&self) -> *const u8 {
        self.replacement
    }

    /// Number of bytes displaced from the target
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Current lifecycle state
    pub fn state(&self) -> HookState {
        self.state
    }

    /// Shorthand for `state() == HookState::Installed`
    pub fn is_installed(&self) -> bool {
        self.state == HookState::Installed
    }
}

impl Drop for JmpHook {
    fn drop(&mut self) {
        if self.state != HookState::Installed {
            return;
        }
        if let Err(e) = self.close() {
            log::error!(
                "failed to unhook {:#x} on drop, leaking its trampoline: {}",
                self.target as usize,
                e
            );
            mem::forget(self.trampoline.take());
        }
    }
}
