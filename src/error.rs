//! # Error
//!
//! Errors that can occur while installing or removing a hook

use iced_x86::DecoderError;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T, E = HookError> = std::result::Result<T, E>;

/// Errors when hooking a function
#[derive(Debug, Error)]
pub enum HookError {
    /// The requested range is unmapped or not readable
    #[error("Unable to read {len} bytes at {address:#x}")]
    Read {
        /// Start of the range
        address: usize,
        /// Length of the range
        len: usize,
    },
    /// The requested range is not writable in its current protection
    #[error("Unable to write {len} bytes at {address:#x}")]
    Write {
        /// Start of the range
        address: usize,
        /// Length of the range
        len: usize,
    },
    /// An access went past the end of an executable memory region
    #[error("Access of {len} bytes at offset {offset} is outside of a {size} byte region")]
    OutOfBounds {
        /// Offset of the access
        offset: usize,
        /// Length of the access
        len: usize,
        /// Size of the region
        size: usize,
    },
    /// The instruction stream could not be decoded
    #[error("Unable to decode instruction at offset {offset}: {error:?}")]
    Decode {
        /// Offset of the undecodable instruction
        offset: usize,
        /// Error reported by the decoder
        error: DecoderError,
    },
    /// A control transfer instruction starts inside the area the jump would overwrite
    #[error("Branch instruction at offset {offset} found before jump patch area")]
    BranchInPatchRegion {
        /// Offset of the branch
        offset: usize,
    },
    /// An instruction addressing memory relative to the instruction pointer starts inside the patch area
    #[error("IP-relative instruction at offset {offset} found before jump patch area")]
    IpRelativeInPatchRegion {
        /// Offset of the instruction
        offset: usize,
    },
    /// The instructions ran out before enough bytes were covered for the jump
    #[error("Unable to insert jmp within patch size: {available} bytes available, {required} required")]
    InsufficientInstructions {
        /// Bytes covered by the supplied instructions
        available: usize,
        /// Bytes needed for the jump
        required: usize,
    },
    /// The OS refused to allocate executable memory
    #[error("Error allocating executable memory")]
    Allocation(#[source] region::Error),
    /// Error when setting memory protections
    #[error("Error setting memory protections")]
    Protection(#[from] region::Error),
    /// The relocated prologue and the jump back do not fit in the trampoline
    #[error("Trampoline needs {needed} bytes but only {available} are allocated")]
    TrampolineOverflow {
        /// Bytes needed
        needed: usize,
        /// Bytes allocated
        available: usize,
    },
    /// The OS refused to flush the instruction cache
    #[error("Error flushing the instruction cache")]
    CacheFlush(#[source] std::io::Error),
    /// Restoring the original bytes failed part way, the target can no longer be executed safely
    #[error("Target at {address:#x} is left partially restored")]
    CorruptedTarget {
        /// Address of the hooked function
        address: usize,
        /// What went wrong during restoration
        #[source]
        source: Box<HookError>,
    },
    /// The hook was already closed
    #[error("Hook is already closed")]
    AlreadyClosed,
    /// Hooking is not supported for the instruction set this crate was compiled for
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(&'static str),
}
