//! Linear decoding of a byte buffer into [`InstructionRecord`]s

use iced_x86::{Decoder, DecoderError, DecoderOptions, FlowControl, Instruction};

use super::InstructionRecord;
use crate::error::{HookError, Result};

/// Iterator decoding one instruction at a time
///
/// Stops at the end of the buffer, or after yielding the first error.
pub struct Scanner<'a> {
    /// Underlying decoder, positioned at the next instruction
    decoder: Decoder<'a>,
    /// Set once an error has been returned
    failed: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over `data`, which is located at `ip`
    ///
    /// # Panics
    ///
    /// Panics if `bitness` is not 16, 32 or 64
    pub fn new(bitness: u32, data: &'a [u8], ip: u64) -> Self {
        Self {
            decoder: Decoder::with_ip(bitness, data, ip, DecoderOptions::NONE),
            failed: false,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<InstructionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.decoder.can_decode() {
            return None;
        }
        let offset = self.decoder.position();
        let instruction = self.decoder.decode();
        if instruction.is_invalid() {
            self.failed = true;
            let error = match self.decoder.last_error() {
                // an invalid instruction with no reported error can't be relocated either
                DecoderError::None => DecoderError::InvalidInstruction,
                e => e,
            };
            return Some(Err(HookError::Decode { offset, error }));
        }
        Some(Ok(classify(&instruction)))
    }
}

/// Builds the record for a decoded instruction
fn classify(instruction: &Instruction) -> InstructionRecord {
    InstructionRecord {
        length: instruction.len(),
        is_control_transfer: instruction.flow_control() != FlowControl::Next,
        is_ip_relative: instruction.is_ip_rel_memory_operand(),
    }
}

/// Decodes all of `data`.
///
/// Any undecodable byte sequence fails the whole scan, including an instruction cut off by the end
/// of the buffer.
pub fn scan(bitness: u32, data: &[u8]) -> Result<Vec<InstructionRecord>> {
    Scanner::new(bitness, data, 0).collect()
}

/// Decodes `data` until at least `min_len` bytes are covered.
///
/// Bytes past the instruction that crosses `min_len` are never looked at, so a window that ends in
/// the middle of an unrelated instruction does not fail the scan.
pub fn scan_prefix(
    bitness: u32,
    data: &[u8],
    ip: u64,
    min_len: usize,
) -> Result<Vec<InstructionRecord>> {
    let mut scanner = Scanner::new(bitness, data, ip);
    let mut covered = 0;
    let mut records = Vec::new();
    while covered < min_len {
        match scanner.next() {
            Some(record) => {
                let record = record?;
                covered += record.length;
                records.push(record);
            }
            None => break,
        }
    }
    Ok(records)
}
