//! # Code
//!
//! Analysis of the machine code at a hook target: decoding it into [`InstructionRecord`]s and
//! finding how many whole instructions have to be displaced to fit a jump.

pub mod boundary;
pub mod listing;
pub mod scan;

pub use boundary::compute_patch_size;
pub use scan::{scan, scan_prefix, Scanner};

/// What the patching code needs to know about a single decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Encoded length in bytes, never 0
    pub length: usize,
    /// Jumps, calls, returns and anything else that does not simply fall through
    pub is_control_transfer: bool,
    /// Has a memory operand addressed relative to the instruction pointer
    pub is_ip_relative: bool,
}

impl InstructionRecord {
    /// Record for an instruction that can be copied anywhere unchanged
    pub fn plain(length: usize) -> Self {
        Self {
            length,
            is_control_transfer: false,
            is_ip_relative: false,
        }
    }

    /// Record for a control transfer instruction
    pub fn branch(length: usize) -> Self {
        Self {
            length,
            is_control_transfer: true,
            is_ip_relative: false,
        }
    }
}
