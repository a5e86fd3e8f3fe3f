//! Data link layer (L2).
//!
//! # Reset contract
//!
//! `reset` opens every configured interface, performs the power-line
//! unique-id probe where applicable, and arms the transceiver parameter
//! timer. Any failure leaves `reset_ok` false and the layer inert; the
//! stack refuses to enter the configured state in that case.
//!
//! # Pump contract
//!
//! `send` and `receive` are cooperative steps: each moves at most one
//! frame and never blocks. The only blocking call in this module is the
//! 500 ms retry sleep inside the reset-time unique-id probe.

pub mod crc;
pub mod lpdu;
pub mod sicb;
pub mod testing;
pub mod traits;
pub mod xcvr;

pub use traits::{LinkCaps, LinkError, LonLink};

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{debug, error, warn};

use lon_core::addr::UniqueId;
use lon_core::config::{decode_buffer_count, decode_buffer_size, ReadOnlyData};
use lon_core::stats::{NodeStats, StatId};
use lon_core::time::{Clock, RepeatTimer, Sleeper};
use lon_queue::{RingBuffer, MAX_RING_CAPACITY};

use crate::records::{Channels, LkSendParam, NwRxParam};
use lpdu::LpduHeader;
use xcvr::XcvrState;

/// Period of the power-line transceiver parameter probe.
const XCVR_PROBE_PERIOD_MS: u64 = 10_000;
/// Retry interval while awaiting the unique-id response at reset.
const UNIQUE_ID_RETRY_MS: u32 = 500;

/// One opened interface with its reassembly ring and transceiver state.
struct Port {
    link: Box<dyn LonLink>,
    rx: RingBuffer,
    xcvr: XcvrState,
}

impl Port {
    /// Move pending link bytes into the reassembly ring.
    fn pump_rx(&mut self) {
        let mut chunk = [0u8; 64];
        loop {
            let n = match self.link.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("link: read fault: {}", e);
                    break;
                }
            };
            let wrote = self.rx.write(&chunk[..n]);
            if wrote < n {
                warn!("link: reassembly ring overflow, {} bytes lost", n - wrote);
                break;
            }
        }
    }
}

/// The data link layer.
pub struct LinkLayer {
    ports: Vec<Port>,
    reset_ok: bool,
    pl_timer: Option<RepeatTimer>,
    unique_id: Option<UniqueId>,
}

impl LinkLayer {
    pub const fn new() -> Self {
        Self {
            ports: Vec::new(),
            reset_ok: false,
            pl_timer: None,
            unique_id: None,
        }
    }

    /// Open the configured interfaces and bring the layer up.
    ///
    /// For power-line interfaces this blocks in 500 ms steps until the
    /// transceiver answers the unique-id read; reset happens once, so the
    /// wait is tolerated.
    pub fn reset(
        &mut self,
        ro: &ReadOnlyData,
        links: Vec<Box<dyn LonLink>>,
        clock: &dyn Clock,
        sleeper: &dyn Sleeper,
    ) {
        self.ports.clear();
        self.reset_ok = false;
        self.pl_timer = None;
        self.unique_id = None;

        let slot = usize::from(decode_buffer_size(ro.nw_in_buf_size_code)) + 6;
        let depth = usize::from(decode_buffer_count(ro.nw_in_q_cnt_code));
        let ring_cap = (slot * depth).min(MAX_RING_CAPACITY);

        for mut link in links {
            if let Err(e) = link.open() {
                error!("link: interface open failed: {}", e);
                return;
            }
            let rx = match RingBuffer::new(ring_cap) {
                Ok(rx) => rx,
                Err(e) => {
                    error!("link: {}", e);
                    return;
                }
            };
            self.ports.push(Port {
                link,
                rx,
                xcvr: XcvrState::default(),
            });
        }

        if cfg!(feature = "powerline") {
            let mut any_pl = false;
            for port in &mut self.ports {
                if !port.link.caps().power_line {
                    continue;
                }
                any_pl = true;
                if self.unique_id.is_none() {
                    self.unique_id = Some(Self::probe_unique_id(port, sleeper));
                }
            }
            if any_pl {
                self.pl_timer = Some(RepeatTimer::start(clock, XCVR_PROBE_PERIOD_MS));
            }
        }

        self.reset_ok = true;
    }

    /// Whether the last reset completed.
    #[inline]
    pub fn is_reset_ok(&self) -> bool {
        self.reset_ok
    }

    /// Unique id learned from the power-line transceiver at reset.
    #[inline]
    pub fn unique_id(&self) -> Option<UniqueId> {
        self.unique_id
    }

    /// Cached transceiver parameters of one interface.
    pub fn xcvr_params(&self, interface: usize) -> Option<xcvr::XcvrParams> {
        let port = self.ports.get(interface)?;
        port.xcvr.valid.then_some(port.xcvr.params)
    }

    /// Close every interface.
    pub fn shutdown(&mut self) {
        for port in &mut self.ports {
            port.link.close();
        }
        self.ports.clear();
        self.reset_ok = false;
    }

    /// Read-Unique-ID probe: retry on 500 ms intervals until the
    /// transceiver answers.
    fn probe_unique_id(port: &mut Port, sleeper: &dyn Sleeper) -> UniqueId {
        let request = xcvr::build_read_unique_id();
        let mut frame = [0u8; sicb::MAX_FRAME];
        loop {
            if let Err(e) = port.link.write(&request) {
                debug!("link: unique-id request not accepted: {}", e);
            }
            sleeper.sleep_ms(UNIQUE_ID_RETRY_MS);
            port.pump_rx();
            while let Some(total) = sicb::take_frame(&mut port.rx, &mut frame) {
                if let Some(id) = xcvr::parse_unique_id_response(&frame[..total]) {
                    return id;
                }
            }
        }
    }

    /// Outbound pump: power-line housekeeping, then at most one frame.
    ///
    /// The priority queue always preempts. The same frame goes to every
    /// configured interface.
    pub fn send(&mut self, ch: &mut Channels, stats: &mut NodeStats, clock: &dyn Clock) {
        if !self.reset_ok {
            return;
        }
        self.powerline_housekeeping(clock);

        let (q, priority) = if !ch.lk_out_pri.is_empty() {
            (&mut ch.lk_out_pri, true)
        } else if !ch.lk_out.is_empty() {
            (&mut ch.lk_out, false)
        } else {
            return;
        };

        let slot = match q.peek() {
            Some(slot) => slot,
            None => return,
        };
        let param = LkSendParam::read_from(slot);
        let npdu_area = &slot[LkSendParam::WIRE_LEN..];

        let mut frame = [0u8; sicb::MAX_FRAME];
        frame[0] = sicb::NICB_OUTGOING_L2;
        frame[2] = LpduHeader::new(priority, param.alt_path, param.delta_bl).to_byte();
        // Bounded copy: never past the frame buffer or the slot.
        let copy = usize::from(param.pdu_size)
            .min(npdu_area.len())
            .min(frame.len() - 5);
        frame[3..3 + copy].copy_from_slice(&npdu_area[..copy]);
        let payload_len = 1 + copy;

        let crc_bytes = crc::crc16(&frame[2..2 + payload_len]).to_be_bytes();
        for port in &mut self.ports {
            let with_crc = !port.link.caps().computes_crc;
            let total_payload = payload_len + if with_crc { 2 } else { 0 };
            frame[1] = total_payload as u8;
            if with_crc {
                frame[2 + payload_len..2 + payload_len + 2].copy_from_slice(&crc_bytes);
            }
            if let Err(e) = port.link.write(&frame[..2 + total_payload]) {
                stats.increment(StatId::TxError);
                debug!("link: transmit failed: {}", e);
            }
        }

        q.drop_head();
    }

    /// Inbound pump: poll each interface, classify at most one frame.
    pub fn receive(&mut self, ch: &mut Channels, stats: &mut NodeStats) {
        if !self.reset_ok {
            return;
        }
        for port in &mut self.ports {
            port.pump_rx();
        }
        let mut frame = [0u8; sicb::MAX_FRAME];
        for port in &mut self.ports {
            if let Some(total) = sicb::take_frame(&mut port.rx, &mut frame) {
                Self::classify(port, &frame[..total], ch, stats);
                return;
            }
        }
    }

    fn classify(port: &mut Port, frame: &[u8], ch: &mut Channels, stats: &mut NodeStats) {
        let cmd = frame[0];
        let len = usize::from(frame[1]);
        let payload = &frame[2..2 + len];
        let power_line = cfg!(feature = "powerline") && port.link.caps().power_line;

        if cmd == sicb::NICB_RESPONSE {
            if let Some(params) = xcvr::parse_xcvr_response(frame) {
                port.xcvr.cache(params);
            }
            return;
        }

        if sicb::is_error_cmd(cmd) {
            stats.increment(StatId::TxError);
            debug!("link: interface error report {:#04x}", cmd);
            return;
        }

        if matches!(
            cmd,
            sicb::NICB_RESET | sicb::NICB_INCOMING_L2 | sicb::NICB_INCOMING_L2M1
        ) {
            if power_line {
                // The transceiver forgot its phase setting; re-send it.
                port.xcvr.phase_lost = true;
            }
            return;
        }

        if cmd != sicb::NICB_INCOMING_L2M2 {
            debug!("link: unknown SICB command {:#04x} dropped", cmd);
            return;
        }

        // Marker, status register and zero-crossing bytes surround the LPDU.
        let lpdu_size = match len.checked_sub(3) {
            Some(size) if size >= 8 => size,
            _ => {
                stats.increment(StatId::TxError);
                return;
            }
        };
        if payload[0] != sicb::NICB_LOCAL_NM {
            stats.increment(StatId::Missed);
            return;
        }

        let header = LpduHeader::from_byte(payload[1]);
        let pdu_size = lpdu_size - 3;
        let npdu = &payload[2..2 + pdu_size];

        if power_line {
            port.xcvr.harvest(payload[len - 2], payload[len - 1]);
        }

        let slot = match ch.nw_in.tail() {
            Some(slot) => slot,
            None => {
                stats.increment(StatId::Missed);
                return;
            }
        };
        if slot.len() < NwRxParam::WIRE_LEN + pdu_size {
            stats.increment(StatId::RxError);
            warn!("link: {}-byte NPDU exceeds network buffer", pdu_size);
            return;
        }
        NwRxParam {
            priority: header.priority(),
            alt_path: header.alt_path(),
            pdu_size: pdu_size as u16,
        }
        .write_to(slot);
        slot[NwRxParam::WIRE_LEN..NwRxParam::WIRE_LEN + pdu_size].copy_from_slice(npdu);
        ch.nw_in.commit_tail();
        stats.increment(StatId::L2Rx);
    }

    /// Periodic transceiver parameter fetch and phase re-send.
    fn powerline_housekeeping(&mut self, clock: &dyn Clock) {
        if !cfg!(feature = "powerline") {
            return;
        }
        let probe_due = self
            .pl_timer
            .as_mut()
            .is_some_and(|timer| timer.expired(clock));

        for port in &mut self.ports {
            if !port.link.caps().power_line {
                continue;
            }
            if probe_due {
                port.xcvr.fetch_pending = true;
            }
            if port.xcvr.fetch_pending {
                // A failed send keeps the flag set; the next tick retries.
                if port.link.write(&xcvr::build_query_xcvr()).is_ok() {
                    port.xcvr.fetch_pending = false;
                }
            }
            if port.xcvr.phase_lost {
                if port.link.write(&sicb::phase_frame()).is_ok() {
                    port.xcvr.phase_lost = false;
                }
            }
        }
    }
}

impl Default for LinkLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{build_incoming_l2m2, management_response, ScriptedLink};
    use super::*;
    use lon_core::time::testing::ManualClock;

    fn ro() -> ReadOnlyData {
        ReadOnlyData::with_unique_id([0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    /// Reset a layer over one scripted link, returning the test-side
    /// handle of that link.
    fn layer_with(link: ScriptedLink) -> (LinkLayer, ScriptedLink, Channels, NodeStats, ManualClock) {
        let clock = ManualClock::new();
        let handle = link.clone();
        let mut layer = LinkLayer::new();
        layer.reset(&ro(), alloc::vec![Box::new(link) as Box<dyn LonLink>], &clock, &clock);
        assert!(layer.is_reset_ok());
        let ch = Channels::allocate(&ro()).unwrap();
        (layer, handle, ch, NodeStats::new(), clock)
    }

    // ==================== Outbound ====================

    #[test]
    fn test_send_prefers_priority_queue() {
        let (mut layer, link, mut ch, mut stats, clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        let slot = ch.lk_out.tail().unwrap();
        LkSendParam { alt_path: false, delta_bl: 0, pdu_size: 1 }.write_to(slot);
        slot[LkSendParam::WIRE_LEN] = 0xAA;
        ch.lk_out.commit_tail();

        let slot = ch.lk_out_pri.tail().unwrap();
        LkSendParam { alt_path: false, delta_bl: 0, pdu_size: 1 }.write_to(slot);
        slot[LkSendParam::WIRE_LEN] = 0xBB;
        ch.lk_out_pri.commit_tail();

        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        // priority bit set, priority payload out first
        assert_eq!(written[0][2] & 0x01, 0x01);
        assert_eq!(written[0][3], 0xBB);
        assert!(ch.lk_out_pri.is_empty());
        assert_eq!(ch.lk_out.len(), 1);
    }

    #[test]
    fn test_outgoing_frame_layout() {
        let (mut layer, link, mut ch, mut stats, clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        let npdu = [0x05u8, 0x05, 0x83, 0x00, 0xAB, 0x10, 0x20];
        let slot = ch.lk_out.tail().unwrap();
        LkSendParam { alt_path: true, delta_bl: 2, pdu_size: npdu.len() as u16 }.write_to(slot);
        slot[LkSendParam::WIRE_LEN..LkSendParam::WIRE_LEN + npdu.len()].copy_from_slice(&npdu);
        ch.lk_out.commit_tail();

        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        let frame = &written[0];
        assert_eq!(frame[0], sicb::NICB_OUTGOING_L2);
        assert_eq!(usize::from(frame[1]), npdu.len() + 1);
        let hdr = LpduHeader::from_byte(frame[2]);
        assert!(!hdr.priority());
        assert!(hdr.alt_path());
        assert_eq!(hdr.delta_bl(), 2);
        assert_eq!(&frame[3..], &npdu);
    }

    #[test]
    fn test_crc_appended_when_interface_lacks_it() {
        let caps = LinkCaps { power_line: false, computes_crc: false };
        let (mut layer, link, mut ch, mut stats, clock) = layer_with(ScriptedLink::new(caps));

        let npdu = [0x05u8, 0x01, 0x80, 0x00];
        let slot = ch.lk_out.tail().unwrap();
        LkSendParam { alt_path: false, delta_bl: 0, pdu_size: npdu.len() as u16 }.write_to(slot);
        slot[LkSendParam::WIRE_LEN..LkSendParam::WIRE_LEN + npdu.len()].copy_from_slice(&npdu);
        ch.lk_out.commit_tail();

        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        let frame = &written[0];
        assert_eq!(usize::from(frame[1]), npdu.len() + 3);
        let body_end = frame.len() - 2;
        let expected = crc::crc16(&frame[2..body_end]).to_be_bytes();
        assert_eq!(&frame[body_end..], &expected);
    }

    // ==================== Inbound ====================

    #[test]
    fn test_incoming_l2m2_reaches_network_queue() {
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        let npdu = [0x05u8, 0x05, 0x83, 0x00, 0xAB, 0x10, 0x20];
        link.push_rx(&build_incoming_l2m2(&npdu, true, false, 0, 0));

        layer.receive(&mut ch, &mut stats);
        assert_eq!(ch.nw_in.len(), 1);
        let slot = ch.nw_in.peek().unwrap();
        let param = NwRxParam::read_from(slot);
        assert!(param.priority);
        assert!(!param.alt_path);
        assert_eq!(usize::from(param.pdu_size), npdu.len());
        assert_eq!(&slot[NwRxParam::WIRE_LEN..NwRxParam::WIRE_LEN + npdu.len()], &npdu);
        assert_eq!(stats.get(StatId::L2Rx), 1);
    }

    #[test]
    fn test_short_lpdu_counts_tx_error() {
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        // lpdu_size = len - 3 = 7 < 8
        let mut frame = alloc::vec![sicb::NICB_INCOMING_L2M2, 10];
        frame.extend_from_slice(&[0u8; 10]);
        link.push_rx(&frame);

        layer.receive(&mut ch, &mut stats);
        assert!(ch.nw_in.is_empty());
        assert_eq!(stats.get(StatId::TxError), 1);
    }

    #[test]
    fn test_error_report_counts_tx_error() {
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));
        link.push_rx(&[sicb::NICB_ERROR_BASE + 2, 0]);
        layer.receive(&mut ch, &mut stats);
        assert_eq!(stats.get(StatId::TxError), 1);
        assert!(ch.nw_in.is_empty());
    }

    #[test]
    fn test_marker_mismatch_counts_missed() {
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        let npdu = [0x05u8, 0x05, 0x83, 0x00, 0xAB, 0x10, 0x20];
        let mut frame = build_incoming_l2m2(&npdu, false, false, 0, 0);
        frame[2] = 0x00; // clobber the marker
        link.push_rx(&frame);

        layer.receive(&mut ch, &mut stats);
        assert!(ch.nw_in.is_empty());
        assert_eq!(stats.get(StatId::Missed), 1);
    }

    #[test]
    fn test_full_network_queue_counts_missed() {
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::TP));

        let npdu = [0x05u8, 0x05, 0x83, 0x00, 0xAB, 0x10, 0x20];
        while !ch.nw_in.is_full() {
            if let Some(slot) = ch.nw_in.tail() {
                slot[0] = 0;
            }
            ch.nw_in.commit_tail();
        }
        link.push_rx(&build_incoming_l2m2(&npdu, false, false, 0, 0));

        layer.receive(&mut ch, &mut stats);
        assert_eq!(stats.get(StatId::Missed), 1);
    }

    // ==================== Power-line ====================

    #[test]
    fn test_reset_probes_unique_id_on_powerline() {
        let id = [9u8, 8, 7, 6, 5, 4];
        let link = ScriptedLink::new(LinkCaps::PL).answer_unique_id(id);
        let (layer, _link, _ch, _stats, _clock) = layer_with(link);
        assert_eq!(layer.unique_id(), Some(id));
    }

    #[test]
    fn test_xcvr_probe_fires_on_timer() {
        let id = [1u8, 1, 1, 1, 1, 1];
        let (mut layer, link, mut ch, mut stats, clock) =
            layer_with(ScriptedLink::new(LinkCaps::PL).answer_unique_id(id));
        link.take_written();

        layer.send(&mut ch, &mut stats, &clock);
        assert!(link.take_written().is_empty());

        clock.advance_ms(10_000);
        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0][3], xcvr::ND_QUERY_XCVR);
    }

    #[test]
    fn test_failed_probe_retries_next_tick() {
        let id = [1u8, 1, 1, 1, 1, 1];
        let (mut layer, link, mut ch, mut stats, clock) =
            layer_with(ScriptedLink::new(LinkCaps::PL).answer_unique_id(id));
        link.take_written();

        clock.advance_ms(10_000);
        link.fail_next_writes(1);
        layer.send(&mut ch, &mut stats, &clock);
        assert!(link.take_written().is_empty());

        // no new timer expiry needed; the pending flag is still set
        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0][3], xcvr::ND_QUERY_XCVR);
    }

    #[test]
    fn test_mode_change_resends_phase() {
        let id = [1u8, 1, 1, 1, 1, 1];
        let (mut layer, link, mut ch, mut stats, clock) =
            layer_with(ScriptedLink::new(LinkCaps::PL).answer_unique_id(id));
        link.take_written();

        // a non-mode-2 incoming frame marks the phase setting lost
        link.push_rx(&[sicb::NICB_INCOMING_L2M1, 0]);
        layer.receive(&mut ch, &mut stats);

        layer.send(&mut ch, &mut stats, &clock);
        let written = link.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], sicb::phase_frame().to_vec());
    }

    #[test]
    fn test_xcvr_response_updates_cache() {
        let id = [1u8, 1, 1, 1, 1, 1];
        let (mut layer, link, mut ch, mut stats, _clock) =
            layer_with(ScriptedLink::new(LinkCaps::PL).answer_unique_id(id));

        let regs = [0x10u8, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70];
        link.push_rx(&management_response(
            xcvr::response_success(xcvr::ND_QUERY_XCVR),
            &regs,
        ));

        layer.receive(&mut ch, &mut stats);
        assert_eq!(layer.xcvr_params(0), Some(regs));
        assert!(ch.nw_in.is_empty());
    }

    #[test]
    fn test_frame_fans_out_to_every_interface() {
        let clock = ManualClock::new();
        let first = ScriptedLink::new(LinkCaps::TP);
        let second = ScriptedLink::new(LinkCaps::TP);
        let mut layer = LinkLayer::new();
        layer.reset(
            &ro(),
            alloc::vec![
                Box::new(first.clone()) as Box<dyn LonLink>,
                Box::new(second.clone()) as Box<dyn LonLink>,
            ],
            &clock,
            &clock,
        );
        let mut ch = Channels::allocate(&ro()).unwrap();
        let mut stats = NodeStats::new();

        let slot = ch.lk_out.tail().unwrap();
        LkSendParam { alt_path: false, delta_bl: 0, pdu_size: 1 }.write_to(slot);
        slot[LkSendParam::WIRE_LEN] = 0x42;
        ch.lk_out.commit_tail();

        layer.send(&mut ch, &mut stats, &clock);
        assert_eq!(first.take_written().len(), 1);
        assert_eq!(second.take_written().len(), 1);
    }
}
