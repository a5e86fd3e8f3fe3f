//! Outbound pipeline: send requests → NPDU → link queues.

use log::{debug, warn};
use lon_core::addr::{DestAddr, DomainIndex, SourceAddr, MAX_DOMAIN_ID_LEN};
use lon_core::config::{ConfigData, ReadOnlyData};
use lon_core::stats::{NodeStats, StatId};
use lon_queue::Queue;

use super::npdu::{DomainId, ParsedNpdu};
use super::NetworkLayer;
use crate::records::{Channels, CompletionEvent, LkSendParam, NwSendRequest};

impl NetworkLayer {
    /// Outbound pump: move at most one request toward the link.
    ///
    /// Priority preempts: the priority pair is used whenever it has work
    /// and room. A full link queue (or a full completion queue ahead of
    /// an APDU) skips the tick and leaves the head where it is.
    pub fn send(
        &mut self,
        ch: &mut Channels,
        cfg: &ConfigData,
        ro: &ReadOnlyData,
        stats: &mut NodeStats,
    ) {
        if !self.reset_ok {
            return;
        }

        let Channels {
            nw_out,
            nw_out_pri,
            lk_out,
            lk_out_pri,
            completions,
            ..
        } = ch;
        let (nw_q, lk_q) = if !nw_out_pri.is_empty() && !lk_out_pri.is_full() {
            (nw_out_pri, lk_out_pri)
        } else if !nw_out.is_empty() && !lk_out.is_full() {
            (nw_out, lk_out)
        } else {
            return;
        };

        let slot = match nw_q.peek() {
            Some(slot) => slot,
            None => return,
        };
        let req = match NwSendRequest::read_from(slot) {
            Some(req) => req,
            None => {
                warn!("net: send request with unknown address mode dropped");
                stats.increment(StatId::TxError);
                nw_q.drop_head();
                return;
            }
        };
        let is_apdu = req.pdu_type.is_apdu();

        // An APDU owes the application a completion event either way;
        // without room for it, delivery order would break. Skip the tick.
        if is_apdu && completions.is_full() {
            return;
        }

        // Domain selection.
        let row = match req.domain_index {
            DomainIndex::Row(i) if usize::from(i) < ro.domain_count() => {
                Some(cfg.domains[usize::from(i)])
            }
            _ => None,
        };

        if !cfg.state.is_configured() && req.drop_if_unconfigured && !req.domain_index.is_flex() {
            Self::finish_drop(nw_q, completions, is_apdu);
            return;
        }

        let (source, source_sel, domain) = match row {
            Some(entry) if entry.invalid => {
                if req.drop_if_unconfigured {
                    // Retry-class replies fail silently here.
                    warn!("net: send on invalid domain row dropped");
                }
                Self::finish_drop(nw_q, completions, is_apdu);
                return;
            }
            Some(entry) => {
                let id_len = usize::from(entry.id_length);
                if id_len > MAX_DOMAIN_ID_LEN {
                    warn!("net: domain row id length {} out of range", id_len);
                    Self::finish_drop(nw_q, completions, is_apdu);
                    return;
                }
                let sel = !matches!(req.dest, DestAddr::MulticastAck { .. });
                (
                    SourceAddr { subnet: entry.subnet, node: entry.node },
                    sel,
                    DomainId::new(&entry.id[..id_len]).unwrap_or(DomainId::EMPTY),
                )
            }
            // Flex: zero source subnet, bare selector bit, echoed domain.
            None => (SourceAddr { subnet: 0, node: 0 }, true, self.flex_domain),
        };

        let header = ParsedNpdu {
            version: req.version & 0x03,
            pdu_type: req.pdu_type,
            source,
            source_sel,
            dest: req.dest,
            domain,
            header_len: 0,
        };

        let lk_slot = match lk_q.tail() {
            Some(slot) => slot,
            None => return,
        };
        let npdu_area = &mut lk_slot[LkSendParam::WIRE_LEN..];
        let header_len = match header.encode_into(npdu_area) {
            Ok(len) => len,
            Err(e) => {
                // Domain lengths outside {0, 1, 3, 6} land here.
                debug!("net: send terminated: {}", e);
                Self::finish_drop(nw_q, completions, is_apdu);
                return;
            }
        };

        let pdu_size = usize::from(req.pdu_size);
        if header_len + pdu_size > npdu_area.len() {
            warn!(
                "net: write past end of net buffer ({} > {})",
                header_len + pdu_size,
                npdu_area.len()
            );
            stats.increment(StatId::TxError);
            Self::finish_drop(nw_q, completions, is_apdu);
            return;
        }
        npdu_area[header_len..header_len + pdu_size].copy_from_slice(
            &slot[NwSendRequest::WIRE_LEN..NwSendRequest::WIRE_LEN + pdu_size],
        );
        LkSendParam {
            alt_path: req.alt_path,
            delta_bl: req.delta_bl & 0x3F,
            pdu_size: (header_len + pdu_size) as u16,
        }
        .write_to(lk_slot);

        nw_q.drop_head();
        lk_q.commit_tail();
        stats.increment(StatId::L3Tx);
        if is_apdu {
            Self::push_completion(completions, true);
        }
    }

    fn finish_drop(nw_q: &mut Queue, completions: &mut Queue, is_apdu: bool) {
        nw_q.drop_head();
        if is_apdu {
            Self::push_completion(completions, false);
        }
    }

    pub(super) fn push_completion(completions: &mut Queue, success: bool) {
        if let Some(slot) = completions.tail() {
            CompletionEvent { success }.write_to(slot);
            completions.commit_tail();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::npdu::PduType;
    use lon_core::addr::DomainEntry;
    use lon_core::config::NodeState;
    use lon_core::config::ReadOnlyData;

    fn configured_cfg() -> ConfigData {
        let mut cfg = ConfigData::unconfigured();
        cfg.domains[0] = DomainEntry {
            id: [0xAB, 0, 0, 0, 0, 0],
            id_length: 1,
            subnet: 5,
            node: 3,
            invalid: false,
        };
        cfg.state = NodeState::Configured;
        cfg
    }

    fn setup() -> (NetworkLayer, Channels, ConfigData, ReadOnlyData, NodeStats) {
        let ro = ReadOnlyData::with_unique_id([0x11; 6]);
        let mut layer = NetworkLayer::new();
        layer.reset(&ro);
        let ch = Channels::allocate(&ro).unwrap();
        (layer, ch, configured_cfg(), ro, NodeStats::new())
    }

    fn apdu_broadcast_request() -> NwSendRequest {
        NwSendRequest {
            version: 0,
            pdu_type: PduType::Apdu,
            domain_index: DomainIndex::Row(0),
            drop_if_unconfigured: true,
            alt_path: false,
            delta_bl: 0,
            dest: DestAddr::Broadcast { subnet: 0 },
            pdu_size: 2,
        }
    }

    // ==================== Golden path ====================

    #[test]
    fn test_broadcast_send_one_domain() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);

        assert!(ch.nw_out.is_empty());
        assert_eq!(ch.lk_out.len(), 1);
        let slot = ch.lk_out.peek().unwrap();
        let param = LkSendParam::read_from(slot);
        assert_eq!(param.pdu_size, 7);
        assert_eq!(
            &slot[LkSendParam::WIRE_LEN..LkSendParam::WIRE_LEN + 7],
            &[0x05, 0x05, 0x83, 0x00, 0xAB, 0x10, 0x20]
        );
        assert_eq!(ch.next_completion(), Some(CompletionEvent { success: true }));
        assert_eq!(stats.get(StatId::L3Tx), 1);
    }

    #[test]
    fn test_priority_request_uses_priority_pair() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], true));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert!(ch.nw_out_pri.is_empty());
        assert_eq!(ch.lk_out_pri.len(), 1);
        assert!(ch.lk_out.is_empty());
    }

    #[test]
    fn test_multicast_ack_clears_source_sel() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        let req = NwSendRequest {
            dest: DestAddr::MulticastAck { subnet: 5, node: 9, group: 2, member: 1 },
            pdu_size: 1,
            ..apdu_broadcast_request()
        };
        assert!(ch.submit(&req, &[0x7E], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        let slot = ch.lk_out.peek().unwrap();
        let npdu = &slot[LkSendParam::WIRE_LEN..];
        // source node byte: sel clear, node 3
        assert_eq!(npdu[2], 0x03);
        // destination node byte carries its own sel bit
        assert_eq!(npdu[4], 0x89);
    }

    // ==================== Backpressure ====================

    #[test]
    fn test_full_link_queue_keeps_head() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        while !ch.lk_out.is_full() {
            ch.lk_out.commit_tail();
        }
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert_eq!(ch.nw_out.len(), 1);
        assert!(ch.next_completion().is_none());
    }

    #[test]
    fn test_full_completion_queue_keeps_apdu() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        while !ch.completions.is_full() {
            NetworkLayer::push_completion(&mut ch.completions, true);
        }
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert_eq!(ch.nw_out.len(), 1);
        assert!(ch.lk_out.is_empty());
    }

    // ==================== Drop policies ====================

    #[test]
    fn test_unconfigured_node_drops_silently() {
        let (mut layer, mut ch, mut cfg, ro, mut stats) = setup();
        cfg.state = NodeState::Unconfigured;
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert!(ch.nw_out.is_empty());
        assert!(ch.lk_out.is_empty());
        assert_eq!(ch.next_completion(), Some(CompletionEvent { success: false }));
    }

    #[test]
    fn test_invalid_domain_row_drops() {
        let (mut layer, mut ch, mut cfg, ro, mut stats) = setup();
        cfg.domains[0].invalid = true;
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert!(ch.lk_out.is_empty());
        assert_eq!(ch.next_completion(), Some(CompletionEvent { success: false }));
    }

    #[test]
    fn test_bad_row_domain_length_terminates() {
        let (mut layer, mut ch, mut cfg, ro, mut stats) = setup();
        cfg.domains[0].id_length = 2; // not encodable
        assert!(ch.submit(&apdu_broadcast_request(), &[0x10, 0x20], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert!(ch.lk_out.is_empty());
        assert_eq!(ch.next_completion(), Some(CompletionEvent { success: false }));
    }

    #[test]
    fn test_oversize_pdu_terminates() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        let req = NwSendRequest { pdu_size: 64, ..apdu_broadcast_request() };
        let pdu = [0u8; 64];
        assert!(ch.submit(&req, &pdu, false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert!(ch.lk_out.is_empty());
        assert_eq!(stats.get(StatId::TxError), 1);
        assert_eq!(ch.next_completion(), Some(CompletionEvent { success: false }));
    }

    // ==================== Flex ====================

    #[test]
    fn test_flex_send_zeroes_source_and_echoes_domain() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        layer.flex_domain = DomainId::new(&[0xDD]).unwrap();
        let req = NwSendRequest {
            domain_index: DomainIndex::Flex,
            pdu_type: PduType::Tpdu,
            pdu_size: 1,
            ..apdu_broadcast_request()
        };
        assert!(ch.submit(&req, &[0x55], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        let slot = ch.lk_out.peek().unwrap();
        let npdu = &slot[LkSendParam::WIRE_LEN..];
        assert_eq!(npdu[1], 0x00); // source subnet 0
        assert_eq!(npdu[2], 0x80); // bare selector bit
        assert_eq!(npdu[4], 0xDD); // echoed flex domain id
    }

    #[test]
    fn test_non_apdu_has_no_completion() {
        let (mut layer, mut ch, cfg, ro, mut stats) = setup();
        let req = NwSendRequest {
            pdu_type: PduType::Tpdu,
            pdu_size: 1,
            ..apdu_broadcast_request()
        };
        assert!(ch.submit(&req, &[0x01], false));

        layer.send(&mut ch, &cfg, &ro, &mut stats);
        assert_eq!(ch.lk_out.len(), 1);
        assert!(ch.next_completion().is_none());
    }
}
