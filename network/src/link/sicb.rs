//! SICB serial command framing between host and transceiver.
//!
//! Every exchange is `cmd(1) | len(1) | payload(len)`. Command codes are
//! the `nicb` set below; unknown codes are dropped by the receive path.
//!
//! Incoming L2 mode 2 packet payloads carry, in order: the
//! stack-destination marker byte, the LPDU (header + NPDU + CRC), then the
//! transceiver status register and zero-crossing bytes:
//!
//! ```notrust
//! +--------+---------------------------+-------+------+
//! | marker | LPDU: hdr | NPDU | CRC(2) |  reg  |  zc  |
//! +--------+---------------------------+-------+------+
//! ```
//!
//! so `lpdu_size = len - 3` and the enclosed NPDU is `lpdu_size - 3`
//! bytes.

use lon_queue::RingBuffer;

// ═══════════════════════════════════════════════════════════════════════════
// COMMAND CODES
// ═══════════════════════════════════════════════════════════════════════════

/// Outgoing L2 packet.
pub const NICB_OUTGOING_L2: u8 = 0x12;
/// Response to a locally issued management request.
pub const NICB_RESPONSE: u8 = 0x16;
/// Incoming packet, L2 mode 0 framing.
pub const NICB_INCOMING_L2: u8 = 0x1A;
/// Incoming packet, L2 mode 1 framing.
pub const NICB_INCOMING_L2M1: u8 = 0x1B;
/// Incoming packet, L2 mode 2 framing (the only accepted inbound mode).
pub const NICB_INCOMING_L2M2: u8 = 0x1C;
/// Local network-management request to the interface, and the
/// stack-destination marker on accepted inbound frames.
pub const NICB_LOCAL_NM: u8 = 0x22;
/// First of the interface error report codes.
pub const NICB_ERROR_BASE: u8 = 0x30;
/// Power-line phase command base; the phase mode is OR'ed into the code.
pub const NICB_PHASE: u8 = 0x40;
/// Interface reset notification.
pub const NICB_RESET: u8 = 0x50;

/// Largest SICB frame: two header bytes plus a 255-byte payload.
pub const MAX_FRAME: usize = 2 + 255;

/// Interface error report codes occupy `0x30..=0x37`.
#[inline]
pub fn is_error_cmd(cmd: u8) -> bool {
    (NICB_ERROR_BASE..NICB_ERROR_BASE + 8).contains(&cmd)
}

/// The two-byte phase re-send command for power-line interfaces.
#[inline]
pub fn phase_frame() -> [u8; 2] {
    [NICB_PHASE | 2, 0]
}

// ═══════════════════════════════════════════════════════════════════════════
// FRAME ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════

/// Pull one complete frame out of the serial byte ring, if present.
///
/// Returns the frame length written to `dst` (`2 + len`). Incomplete
/// frames stay in the ring for the next tick. A frame longer than `dst`
/// is consumed and discarded; the stream stays in sync, the frame is
/// lost.
pub fn take_frame(rx: &mut RingBuffer, dst: &mut [u8]) -> Option<usize> {
    let mut hdr = [0u8; 2];
    if rx.peek(&mut hdr) < 2 {
        return None;
    }
    let total = 2 + usize::from(hdr[1]);
    if rx.len() < total {
        return None;
    }
    if dst.len() < total {
        log::warn!("sicb: {}-byte frame exceeds reassembly buffer, discarded", total);
        rx.skip(total);
        return None;
    }
    rx.read(&mut dst[..total]);
    Some(total)
}
