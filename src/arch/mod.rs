//! # Architecture
//!
//! Jump encoders for the supported instruction sets.
//!
//! Every hook is written through an [`Architecture`]. The variant is picked once with [`host`] and
//! shared between all hooks, nothing else in the crate looks at which variant is in use.

use crate::error::{HookError, Result};

pub mod x64;
pub mod x86;

pub use x64::X64;
pub use x86::X86;

/// Opcode for `jmp rel32`
pub(crate) const OP_NEAR_JMP: u8 = 0xE9;

/// Longest instruction the x86 family can encode
pub const MAX_INSTRUCTION_LEN: usize = 15;

/// Distance above which a `jmp rel32` is no longer used.
///
/// Kept below the 2 GiB reach of a 32-bit displacement.
pub const FAR_JUMP_THRESHOLD: usize = 0x7FFF_0000;

/// Returns true if a jump between `from` and `to` needs the far encoding
pub fn is_far_jump(from: usize, to: usize) -> bool {
    from.abs_diff(to) > FAR_JUMP_THRESHOLD
}

/// Helper functions for an architecture
///
/// Implementations are stateless; the encoders must return the same bytes for the same input.
pub trait Architecture: Send + Sync {
    /// Name of the instruction set, used in logs
    fn name(&self) -> &'static str;
    /// Bitness handed to the decoder (16, 32 or 64)
    fn bitness(&self) -> u32;
    /// Size of a `jmp rel32`
    fn near_jump_size(&self) -> usize;
    /// Size of the encoding returned by [`Architecture::new_far_jump_asm`]
    fn far_jump_size(&self) -> usize;
    /// Generates a jump that works at any distance, placed at `from` and landing on `to`
    fn new_far_jump_asm(&self, from: usize, to: usize) -> Vec<u8>;

    /// Generates a `jmp rel32` placed at `from` and landing on `to`.
    ///
    /// The displacement is truncated to 32 bits, only call this when [`is_far_jump`] is false.
    fn new_near_jump_asm(&self, from: usize, to: usize) -> Vec<u8> {
        let rel = to
            .wrapping_sub(from)
            .wrapping_sub(self.near_jump_size()) as u32;
        let mut asm = Vec::with_capacity(self.near_jump_size());
        asm.push(OP_NEAR_JMP);
        asm.extend_from_slice(&rel.to_le_bytes());
        asm
    }

    /// See [`is_far_jump`]
    fn is_far_jump(&self, from: usize, to: usize) -> bool {
        is_far_jump(from, to)
    }

    /// Number of bytes [`Architecture::new_jump_asm`] emits for this pair
    fn jump_size(&self, from: usize, to: usize) -> usize {
        if self.is_far_jump(from, to) {
            self.far_jump_size()
        } else {
            self.near_jump_size()
        }
    }

    /// Generates the shortest jump from `from` to `to`
    fn new_jump_asm(&self, from: usize, to: usize) -> Vec<u8> {
        if self.is_far_jump(from, to) {
            self.new_far_jump_asm(from, to)
        } else {
            self.new_near_jump_asm(from, to)
        }
    }

    /// Upper bound of the trampoline size.
    ///
    /// The displaced prologue is at most a far jump whose last byte is the first byte of the longest
    /// instruction, and the jump back is at most another far jump.
    fn max_trampoline_size(&self) -> usize {
        self.far_jump_size() + MAX_INSTRUCTION_LEN - 1 + self.far_jump_size()
    }

    /// Bytes of the target that must be readable to find the patch boundary of a jump of
    /// `jump_size` bytes: the last displaced instruction may start at its last byte
    fn lookahead_for(&self, jump_size: usize) -> usize {
        jump_size + MAX_INSTRUCTION_LEN - 1
    }

    /// Bytes of the target that must be readable to find the patch boundary of any jump
    fn lookahead_size(&self) -> usize {
        self.lookahead_for(self.far_jump_size())
    }
}

/// Returns the architecture this crate was compiled for
pub fn host() -> Result<&'static dyn Architecture> {
    if cfg!(target_arch = "x86_64") {
        Ok(&X64)
    } else if cfg!(target_arch = "x86") {
        Ok(&X86)
    } else {
        Err(HookError::UnsupportedArchitecture(std::env::consts::ARCH))
    }
}
