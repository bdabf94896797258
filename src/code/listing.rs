//! Human readable disassembly, used when tracing hook installation

use std::fmt::Write;

use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter};

/// Formats `code` located at `ip` as one `[0xADDR] instruction` line per instruction.
///
/// Undecodable bytes are shown as `(bad)` lines; this is only meant for logs.
pub fn format_code(bitness: u32, code: &[u8], ip: u64) -> String {
    let decoder = Decoder::with_ip(bitness, code, ip, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut listing = String::new();
    let mut text = String::new();
    for instruction in decoder {
        text.clear();
        if instruction.is_invalid() {
            text.push_str("(bad)");
        } else {
            formatter.format(&instruction, &mut text);
        }
        // writing to a `String` never fails
        let _ = writeln!(listing, "[{:#X}] {}", instruction.ip(), text);
    }
    listing
}
