//! # x86
//!
//! Jump encodings for 32-bit code

use std::mem;

use super::Architecture;

#[repr(C, packed)]
#[allow(dead_code)]
/// Struct helper for generating an absolute jump
struct JmpAbs {
    /// Absolute jmp instruction (jmp dword ptr [disp32])
    jmp: [u8; 2],
    /// Address of `target`, which sits right after this instruction
    pointer: u32,
    /// Absolute address to jump to
    target: u32,
}

/// 32-bit x86
#[derive(Debug, Default, Clone, Copy)]
pub struct X86;

impl Architecture for X86 {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn bitness(&self) -> u32 {
        32
    }

    fn near_jump_size(&self) -> usize {
        1 + mem::size_of::<u32>()
    }

    fn far_jump_size(&self) -> usize {
        mem::size_of::<JmpAbs>()
    }

    /// There is no EIP-relative addressing in 32-bit mode, so the pointer is stored inline and
    /// addressed absolutely
    fn new_far_jump_asm(&self, from: usize, to: usize) -> Vec<u8> {
        let jmp = JmpAbs {
            jmp: [0xFF, 0x25],
            pointer: (from as u32).wrapping_add(6).to_le(),
            target: (to as u32).to_le(),
        };
        // Safety: `JmpAbs` is packed plain data
        let bytes: [u8; mem::size_of::<JmpAbs>()] = unsafe { mem::transmute(jmp) };
        bytes.to_vec()
    }
}
