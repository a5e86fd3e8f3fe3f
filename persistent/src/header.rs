//! Persistence header: the plausibility wrapper around segment payloads.

use byteorder::{ByteOrder, LittleEndian};

/// Current header version. Readers accept anything up to this.
pub const CURRENT_VERSION: u8 = 1;

/// Header plausibility signature. Distinct from the transaction
/// signature, it catches reads of the wrong offset rather than torn
/// writes.
pub const HEADER_SIGNATURE: u16 = 0xCF82;

/// Encoded header length on flash.
pub const HEADER_LEN: usize = 10;

/// Per-segment payload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub version: u8,
    /// Payload length in bytes.
    pub length: u16,
    pub signature: u16,
    pub checksum: u8,
    /// Application identity; a mismatch invalidates the segment. Zero is
    /// a wildcard that also skips checksum validation.
    pub app_signature: u32,
}

impl PersistenceHeader {
    pub fn for_payload(payload: &[u8], app_signature: u32) -> Self {
        Self {
            version: CURRENT_VERSION,
            length: payload.len() as u16,
            signature: HEADER_SIGNATURE,
            checksum: compute_checksum(payload),
            app_signature,
        }
    }

    pub fn write_to(&self, out: &mut [u8]) {
        out[0] = self.version;
        LittleEndian::write_u16(&mut out[1..3], self.length);
        LittleEndian::write_u16(&mut out[3..5], self.signature);
        out[5] = self.checksum;
        LittleEndian::write_u32(&mut out[6..10], self.app_signature);
    }

    pub fn read_from(raw: &[u8]) -> Self {
        Self {
            version: raw[0],
            length: LittleEndian::read_u16(&raw[1..3]),
            signature: LittleEndian::read_u16(&raw[3..5]),
            checksum: raw[5],
            app_signature: LittleEndian::read_u32(&raw[6..10]),
        }
    }
}

/// Payload checksum: byte sum plus length, 8-bit wrap.
///
/// The sum runs one byte short of the payload before the length is
/// folded in. Changing that would invalidate every image already in the
/// field, so it stays.
pub fn compute_checksum(payload: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    if !payload.is_empty() {
        for &byte in &payload[..payload.len() - 1] {
            sum = sum.wrapping_add(byte);
        }
    }
    sum.wrapping_add(payload.len() as u8)
}
