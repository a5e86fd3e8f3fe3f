//! Inbound pipeline: NPDU → domain match → policy filters → dispatch.

use log::{debug, trace, warn};
use lon_core::addr::{DestAddr, DomainIndex};
use lon_core::config::{ConfigData, ReadOnlyData};
use lon_core::stats::{NodeStats, StatId};

use super::npdu::{self, PduType};
use super::NetworkLayer;
use crate::records::{Channels, Delivery, NwRxParam};

impl NetworkLayer {
    /// Inbound pump: classify at most one frame from the link.
    ///
    /// Policy drops (wrong domain, wrong address, configuration state) are
    /// silent; only malformed frames count as receive errors. A full
    /// transport queue leaves the head in place for the next tick; a full
    /// application queue drops and counts `Lost`.
    pub fn receive(
        &mut self,
        ch: &mut Channels,
        cfg: &ConfigData,
        ro: &ReadOnlyData,
        stats: &mut NodeStats,
    ) {
        if !self.reset_ok {
            return;
        }

        let Channels { nw_in, app_in, tsa_in, .. } = ch;
        let slot = match nw_in.peek() {
            Some(slot) => slot,
            None => return,
        };
        let rx = NwRxParam::read_from(slot);
        let area = &slot[NwRxParam::WIRE_LEN..];
        let total = usize::from(rx.pdu_size).min(area.len());
        let buf = &area[..total];

        let parsed = match npdu::decode(buf) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("net: undecodable NPDU dropped: {}", e);
                stats.increment(StatId::RxError);
                nw_in.drop_head();
                return;
            }
        };

        // Wire code 3 expands to a 6-byte id, which this check then
        // rejects. Deployed nodes depend on exactly this acceptance set.
        if !matches!(parsed.domain.len(), 0 | 1 | 3) {
            debug!("net: domain length {} rejected on receive", parsed.domain.len());
            stats.increment(StatId::RxError);
            nw_in.drop_head();
            return;
        }

        let domain_index = if cfg.state.is_configured() {
            if cfg.domains[0].matches_id(parsed.domain.as_slice()) {
                DomainIndex::Row(0)
            } else if ro.two_domains && cfg.domains[1].matches_id(parsed.domain.as_slice()) {
                DomainIndex::Row(1)
            } else {
                DomainIndex::Flex
            }
        } else {
            DomainIndex::Flex
        };

        if let DomainIndex::Row(i) = domain_index {
            let row = &cfg.domains[usize::from(i)];

            // Our own transmissions come back around on some channels.
            // Row 1 is exempt from this check, as it always has been.
            if i != 1 && parsed.source.subnet == row.subnet && parsed.source.node == row.node {
                trace!("net: self-loopback frame dropped");
                nw_in.drop_head();
                return;
            }

            let addressed_here = match parsed.dest {
                DestAddr::Broadcast { subnet } => subnet == 0 || subnet == row.subnet,
                DestAddr::Multicast { group } => cfg.is_group_member(i, group),
                DestAddr::SubnetNode { subnet, node } => {
                    subnet == row.subnet && node == row.node
                }
                DestAddr::MulticastAck { subnet, node, group, .. } => {
                    subnet == row.subnet && node == row.node && cfg.is_group_member(i, group)
                }
                DestAddr::UniqueId { unique_id, .. } => unique_id == ro.unique_node_id,
            };
            if !addressed_here {
                trace!("net: frame for another node dropped");
                nw_in.drop_head();
                return;
            }
        }

        // Configuration-state policy.
        let acceptable = match (cfg.state.is_configured(), domain_index) {
            (false, _) => matches!(
                parsed.dest,
                DestAddr::Broadcast { .. } | DestAddr::UniqueId { .. }
            ),
            (true, DomainIndex::Flex) => matches!(parsed.dest, DestAddr::UniqueId { .. }),
            _ => true,
        };
        if !acceptable {
            trace!("net: frame dropped by configuration-state policy");
            nw_in.drop_head();
            return;
        }

        // Flex and unconfigured frames skipped the addressing filter; a
        // unique-id destination still has to be ours.
        if let DestAddr::UniqueId { unique_id, .. } = parsed.dest {
            if unique_id != ro.unique_node_id {
                trace!("net: unique id for another node dropped");
                nw_in.drop_head();
                return;
            }
        }

        let header_len = parsed.header_len;
        if total <= header_len {
            debug!("net: NPDU with empty enclosed PDU dropped");
            stats.increment(StatId::RxError);
            nw_in.drop_head();
            return;
        }
        let pdu_size = total - header_len;
        let pdu = &buf[header_len..total];

        if domain_index.is_flex() {
            // Replies to flex traffic echo this domain back.
            self.flex_domain = parsed.domain;
        }

        let delivery = Delivery {
            source: parsed.source,
            domain_index,
            dest: parsed.dest,
            priority: rx.priority,
            alt_path: rx.alt_path,
            version: parsed.version,
            pdu_size: pdu_size as u16,
        };

        match parsed.pdu_type {
            PduType::Apdu => {
                let dslot = match app_in.tail() {
                    Some(dslot) => dslot,
                    None => {
                        stats.increment(StatId::Lost);
                        nw_in.drop_head();
                        return;
                    }
                };
                if dslot.len() < Delivery::WIRE_LEN + pdu_size {
                    warn!("net: write past end of application buffer");
                    stats.increment(StatId::RxError);
                    nw_in.drop_head();
                    return;
                }
                delivery.write_to(dslot);
                dslot[Delivery::WIRE_LEN..Delivery::WIRE_LEN + pdu_size].copy_from_slice(pdu);
                app_in.commit_tail();
            }
            PduType::Tpdu | PduType::Spdu | PduType::AuthPdu => {
                let dslot = match tsa_in.tail() {
                    // Backpressure: leave the head for the next tick.
                    None => return,
                    Some(dslot) => dslot,
                };
                if dslot.len() < Delivery::WIRE_LEN + pdu_size {
                    warn!("net: write past end of transport buffer");
                    stats.increment(StatId::RxError);
                    nw_in.drop_head();
                    return;
                }
                delivery.write_to(dslot);
                dslot[Delivery::WIRE_LEN..Delivery::WIRE_LEN + pdu_size].copy_from_slice(pdu);
                tsa_in.commit_tail();
            }
        }

        nw_in.drop_head();
        stats.increment(StatId::L3Rx);
    }
}
