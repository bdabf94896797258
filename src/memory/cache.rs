//! Instruction cache maintenance after writing code

use crate::error::Result;

/// Makes bytes written to `address..address + len` visible to instruction fetch.
///
/// Must be called after writing code and before that code runs.
#[cfg(windows)]
pub fn flush_instruction_cache(address: *const u8, len: usize) -> Result<()> {
    use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    // Safety: flushing is harmless for any range of our own process
    let ok = unsafe { FlushInstructionCache(GetCurrentProcess(), address.cast(), len) };
    if ok == 0 {
        return Err(crate::error::HookError::CacheFlush(
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

/// Makes bytes written to `address..address + len` visible to instruction fetch.
///
/// Must be called after writing code and before that code runs. x86 keeps its instruction cache
/// coherent with stores, what remains is ordering the writes and serializing the instruction stream.
#[cfg(not(windows))]
pub fn flush_instruction_cache(address: *const u8, len: usize) -> Result<()> {
    use std::sync::atomic::{fence, Ordering};

    log::trace!("flushing {} bytes at {:#x}", len, address as usize);
    fence(Ordering::SeqCst);
    serialize();
    Ok(())
}

/// Executes a serializing instruction
#[cfg(all(not(windows), target_arch = "x86_64"))]
fn serialize() {
    // Safety: cpuid is available on every x86_64 cpu
    #[allow(unused_unsafe)]
    let _ = unsafe { std::arch::x86_64::__cpuid(0) };
}

/// Nothing beyond the fence is needed
#[cfg(all(not(windows), not(target_arch = "x86_64")))]
fn serialize() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Flushing a range we own succeeds
    fn test_flush() {
        let code = [0xC3u8; 16];
        flush_instruction_cache(code.as_ptr(), code.len()).unwrap();
    }
}
