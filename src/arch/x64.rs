//! # x64
//!
//! Jump encodings for 64-bit code

use std::mem;

use super::Architecture;

#[repr(C, packed)]
#[allow(dead_code)]
/// Struct helper for generating an absolute jump without touching any register
struct JmpAbs {
    /// `push imm32`, sign extended to 64 bits by the cpu
    push: u8,
    /// Low half of the target
    low: u32,
    /// `mov dword ptr [rsp + 4], imm32`
    mov: [u8; 4],
    /// High half of the target, overwriting the sign extension
    high: u32,
    /// `ret` into the rebuilt address
    ret: u8,
}

/// 64-bit x86
#[derive(Debug, Default, Clone, Copy)]
pub struct X64;

impl Architecture for X64 {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn bitness(&self) -> u32 {
        64
    }

    fn near_jump_size(&self) -> usize {
        1 + mem::size_of::<u32>()
    }

    fn far_jump_size(&self) -> usize {
        mem::size_of::<JmpAbs>()
    }

    fn new_far_jump_asm(&self, _from: usize, to: usize) -> Vec<u8> {
        let to = to as u64;
        let jmp = JmpAbs {
            push: 0x68,
            low: (to as u32).to_le(),
            mov: [0xC7, 0x44, 0x24, 0x04],
            high: ((to >> 32) as u32).to_le(),
            ret: 0xC3,
        };
        // Safety: `JmpAbs` is packed plain data
        let bytes: [u8; mem::size_of::<JmpAbs>()] = unsafe { mem::transmute(jmp) };
        bytes.to_vec()
    }
}
