//! Transaction record: the two-word preamble guarding every segment.
//!
//! State machine, using only 1→0 writes between whole-block erases:
//!
//! ```notrust
//! enter:  signature = TX_SIGNATURE, state = 0x00000000   (in transaction)
//! erase:  signature = 0xFFFFFFFF,   state = 0xFFFFFFFF   (still invalid)
//! exit:   signature = TX_SIGNATURE, state = 0xFFFFFFFF   (data valid)
//! ```
//!
//! Every transition from the erased state clears bits, so a crash at any
//! point reads back as one of the invalid states.

use byteorder::{ByteOrder, LittleEndian};

/// Marker distinguishing a deliberate record from erased or torn bytes.
pub const TX_SIGNATURE: u32 = 0x89AB_CDEF;

/// Encoded record length on flash.
pub const TX_RECORD_LEN: usize = 8;

/// The on-flash transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRecord {
    pub signature: u32,
    pub tx_state: u32,
}

impl TransactionRecord {
    /// The enter-transaction state.
    pub const fn entered() -> Self {
        Self { signature: TX_SIGNATURE, tx_state: 0 }
    }

    /// The exit-transaction (valid data) state.
    pub const fn committed() -> Self {
        Self { signature: TX_SIGNATURE, tx_state: 0xFFFF_FFFF }
    }

    /// Stored data is valid only in the committed state.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.signature == TX_SIGNATURE && self.tx_state == 0xFFFF_FFFF
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[0..4], self.signature);
        LittleEndian::write_u32(&mut out[4..8], self.tx_state);
    }

    pub fn read_from(raw: &[u8]) -> Self {
        Self {
            signature: LittleEndian::read_u32(&raw[0..4]),
            tx_state: LittleEndian::read_u32(&raw[4..8]),
        }
    }
}
