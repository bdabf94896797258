//! # Trampoline
//!
//! A trampoline is a small piece of executable memory that behaves like the hooked function did
//! before it was patched: it runs the displaced prologue and jumps back into the rest of the
//! original function.

use region::Protection;

use crate::arch::Architecture;
use crate::error::{HookError, Result};
use crate::memory::ExecutableMemory;

/// Builds a trampoline for `target`.
///
/// - `prologue`: bytes read from `target`, at least `patch_size` long
/// - `patch_size`: number of bytes the hook will displace, must end on an instruction boundary
///
/// The returned memory holds `prologue[..patch_size]` followed by a jump to `target + patch_size`.
/// It is readable, writable and executable, but its instruction cache has not been flushed yet.
pub fn build(
    arch: &dyn Architecture,
    prologue: &[u8],
    patch_size: usize,
    target: usize,
) -> Result<ExecutableMemory> {
    if prologue.len() < patch_size {
        return Err(HookError::OutOfBounds {
            offset: 0,
            len: patch_size,
            size: prologue.len(),
        });
    }

    let mut trampoline =
        ExecutableMemory::allocate(arch.max_trampoline_size(), Protection::READ_WRITE_EXECUTE)?;

    // resume the original right after the displaced instructions
    let from = trampoline.address() + patch_size;
    let to = target + patch_size;
    let jmp = arch.new_jump_asm(from, to);

    let needed = patch_size + jmp.len();
    if needed > trampoline.len() {
        return Err(HookError::TrampolineOverflow {
            needed,
            available: trampoline.len(),
        });
    }

    trampoline.write(&prologue[..patch_size])?;
    trampoline.write_at(patch_size, &jmp)?;

    log::debug!(
        "built trampoline at {:#x} for {:#x}: {} displaced bytes, {} byte jump back",
        trampoline.address(),
        target,
        patch_size,
        jmp.len()
    );
    Ok(trampoline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{X64, X86};

    /// push ebp; mov ebp, esp; sub esp, 8; nop
    const PROLOGUE: [u8; 7] = [0x55, 0x89, 0xE5, 0x83, 0xEC, 0x08, 0x90];

    #[test]
    /// The prologue is copied verbatim and followed by a jump back past the patch
    fn test_layout() {
        let target = 0x1000;
        let trampoline = build(&X64, &PROLOGUE, 6, target).unwrap();
        let base = trampoline.address();

        assert_eq!(trampoline.read(0, 6).unwrap(), PROLOGUE[..6]);
        let expected = X64.new_jump_asm(base + 6, target + 6);
        assert_eq!(trampoline.read(6, expected.len()).unwrap(), expected);
    }

    #[test]
    /// The trampoline is allocated with the derived maximum size
    fn test_size() {
        let trampoline = build(&X86, &PROLOGUE, 3, 0x1000).unwrap();
        assert_eq!(trampoline.len(), X86.max_trampoline_size());
        assert_eq!(trampoline.protection(), Protection::READ_WRITE_EXECUTE);
    }

    #[test]
    /// The longest possible patch still fits next to a far jump back
    fn test_worst_case_fits() {
        let prologue = [0x90; 64];
        let patch_size = X64.far_jump_size() + crate::arch::MAX_INSTRUCTION_LEN - 1;
        let trampoline = build(&X64, &prologue, patch_size, usize::MAX / 2).unwrap();
        assert_eq!(trampoline.read(0, patch_size).unwrap(), prologue[..patch_size]);
    }

    #[test]
    /// Asking for more bytes than were read is an error
    fn test_short_prologue() {
        assert!(matches!(
            build(&X86, &PROLOGUE, 8, 0x1000),
            Err(HookError::OutOfBounds { .. })
        ));
    }
}
