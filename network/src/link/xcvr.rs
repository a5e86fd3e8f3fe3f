//! Local network-management protocol and the transceiver parameter cache.
//!
//! The core only ever originates two management requests toward the
//! interface: a read-only-data memory read to learn the node's unique id
//! (power-line reset), and a transceiver status query to refresh the
//! register cache. Both wrap the management header below.
//!
//! Request/response framing: commands wrap a 15-byte header: the two
//! SICB bytes, the correlator tag, the message code, and eleven
//! addressing/flag bytes the interface fills in. Message data starts at
//! frame offset [`LNM_DATA_OFFSET`]. Responses echo the tag in the low
//! nibble of their first payload byte and carry `(code & 0x1F) | 0x20` on
//! success.

use alloc::vec::Vec;
use lon_core::addr::UniqueId;

use super::sicb::{NICB_LOCAL_NM, NICB_RESPONSE};

/// Correlator tag for locally issued network-management requests.
pub const LNM_TAG: u8 = 0x0F;

/// Total wrap ahead of the message data (SICB bytes included).
pub const LNM_HEADER_LEN: usize = 15;

/// Frame offset where message data begins.
pub const LNM_DATA_OFFSET: usize = 15;

/// Memory read, network-management code.
pub const NM_READ_MEMORY: u8 = 0x6D;
/// Transceiver status query, network-diagnostics code.
pub const ND_QUERY_XCVR: u8 = 0x54;
/// `NM_READ_MEMORY` address mode: offset into the read-only structure.
pub const READ_ONLY_RELATIVE: u8 = 0x01;

/// Transceiver status register count (power-line).
pub const NUM_XCVR_REGS: usize = 7;

/// Cached transceiver status registers.
pub type XcvrParams = [u8; NUM_XCVR_REGS];

/// Success response code for a request code.
#[inline]
pub fn response_success(code: u8) -> u8 {
    (code & 0x1F) | 0x20
}

/// Failure response code for a request code.
#[inline]
pub fn response_failure(code: u8) -> u8 {
    code & 0x1F
}

/// Wrap a management request in the SICB local-NM envelope.
pub fn build_local_request(code: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LNM_HEADER_LEN + data.len());
    frame.push(NICB_LOCAL_NM);
    frame.push((LNM_HEADER_LEN - 2 + data.len()) as u8);
    frame.push(LNM_TAG);
    frame.push(code);
    frame.resize(LNM_DATA_OFFSET, 0);
    frame.extend_from_slice(data);
    frame
}

/// The unique-id fetch: six bytes from the start of read-only data.
pub fn build_read_unique_id() -> Vec<u8> {
    build_local_request(NM_READ_MEMORY, &[READ_ONLY_RELATIVE, 0x00, 0x00, 6])
}

/// The transceiver status query.
pub fn build_query_xcvr() -> Vec<u8> {
    build_local_request(ND_QUERY_XCVR, &[])
}

/// A parsed local-NM response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LnmResponse<'a> {
    pub code: u8,
    pub data: &'a [u8],
}

/// Parse a `NICB_RESPONSE` frame carrying our tag.
///
/// Returns `None` for frames that are not responses, carry a foreign tag,
/// or end inside the management header.
pub fn parse_response(frame: &[u8]) -> Option<LnmResponse<'_>> {
    if frame.len() < LNM_DATA_OFFSET || frame[0] != NICB_RESPONSE {
        return None;
    }
    if frame[2] & 0x0F != LNM_TAG {
        return None;
    }
    let end = (2 + usize::from(frame[1])).min(frame.len());
    Some(LnmResponse {
        code: frame[3],
        data: &frame[LNM_DATA_OFFSET..end],
    })
}

/// Extract the unique id from a successful memory-read response.
pub fn parse_unique_id_response(frame: &[u8]) -> Option<UniqueId> {
    let resp = parse_response(frame)?;
    if resp.code != response_success(NM_READ_MEMORY) || resp.data.len() < 6 {
        return None;
    }
    let mut id = [0u8; 6];
    id.copy_from_slice(&resp.data[..6]);
    Some(id)
}

/// Extract the register set from a successful status-query response.
pub fn parse_xcvr_response(frame: &[u8]) -> Option<XcvrParams> {
    let resp = parse_response(frame)?;
    if resp.code != response_success(ND_QUERY_XCVR) || resp.data.len() < NUM_XCVR_REGS {
        return None;
    }
    let mut params = [0u8; NUM_XCVR_REGS];
    params.copy_from_slice(&resp.data[..NUM_XCVR_REGS]);
    Some(params)
}

/// Per-interface power-line housekeeping state.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcvrState {
    pub params: XcvrParams,
    /// `params` holds a real response.
    pub valid: bool,
    /// A status query is due (periodic, or a failed send being retried).
    pub fetch_pending: bool,
    /// The interface lost its phase setting and needs the phase command.
    pub phase_lost: bool,
}

impl XcvrState {
    pub fn cache(&mut self, params: XcvrParams) {
        self.params = params;
        self.valid = true;
    }

    /// Fold the post-payload register bytes of an accepted frame into the
    /// cache.
    pub fn harvest(&mut self, reg: u8, zero_crossing: u8) {
        self.params[NUM_XCVR_REGS - 2] = reg;
        self.params[NUM_XCVR_REGS - 1] = zero_crossing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build the response frame the interface would send back.
    fn response_frame(code: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = alloc::vec![NICB_RESPONSE, (LNM_HEADER_LEN - 2 + data.len()) as u8];
        frame.push(0xE0 | LNM_TAG);
        frame.push(code);
        frame.resize(LNM_DATA_OFFSET, 0);
        frame.extend_from_slice(data);
        frame
    }

    #[test]
    fn test_request_envelope() {
        let frame = build_read_unique_id();
        assert_eq!(frame[0], NICB_LOCAL_NM);
        assert_eq!(usize::from(frame[1]), frame.len() - 2);
        assert_eq!(frame[2], LNM_TAG);
        assert_eq!(frame[3], NM_READ_MEMORY);
        assert_eq!(&frame[LNM_DATA_OFFSET..], &[READ_ONLY_RELATIVE, 0, 0, 6]);
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(response_success(NM_READ_MEMORY), 0x2D);
        assert_eq!(response_failure(NM_READ_MEMORY), 0x0D);
        assert_eq!(response_success(ND_QUERY_XCVR), 0x34);
    }

    #[test]
    fn test_unique_id_round_trip() {
        let id = [0xA0, 0xB1, 0xC2, 0xD3, 0xE4, 0xF5];
        let frame = response_frame(response_success(NM_READ_MEMORY), &id);
        assert_eq!(parse_unique_id_response(&frame), Some(id));
    }

    #[test]
    fn test_unique_id_data_at_offset_15() {
        let id = [1, 2, 3, 4, 5, 6];
        let frame = response_frame(response_success(NM_READ_MEMORY), &id);
        assert_eq!(&frame[15..21], &id);
    }

    #[test]
    fn test_failure_response_rejected() {
        let frame = response_frame(response_failure(NM_READ_MEMORY), &[0; 6]);
        assert_eq!(parse_unique_id_response(&frame), None);
    }

    #[test]
    fn test_foreign_tag_rejected() {
        let mut frame = response_frame(response_success(NM_READ_MEMORY), &[0; 6]);
        frame[2] = 0x03;
        assert_eq!(parse_response(&frame), None);
    }

    #[test]
    fn test_xcvr_response_round_trip() {
        let regs = [7, 6, 5, 4, 3, 2, 1];
        let frame = response_frame(response_success(ND_QUERY_XCVR), &regs);
        assert_eq!(parse_xcvr_response(&frame), Some(regs));
    }

    #[test]
    fn test_truncated_response_rejected() {
        let frame = response_frame(response_success(ND_QUERY_XCVR), &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(parse_xcvr_response(&frame[..10]), None);
    }

    #[test]
    fn test_harvest_updates_trailing_regs() {
        let mut state = XcvrState::default();
        state.harvest(0xAA, 0xBB);
        assert_eq!(state.params[NUM_XCVR_REGS - 2], 0xAA);
        assert_eq!(state.params[NUM_XCVR_REGS - 1], 0xBB);
    }
}
