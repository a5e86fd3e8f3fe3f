//! Fixed-layout records carried in the inter-layer queue slots.
//!
//! Every queue between two layers carries opaque byte slots; the first
//! bytes of each slot are one of these records, the enclosed PDU follows.
//! All records have a fixed wire length so slot sizing is just
//! `record length + decoded buffer size`.
//!
//! Multi-byte fields are little-endian; these records never leave the
//! host, the layout only has to be stable across the queue boundary.

use byteorder::{ByteOrder, LittleEndian};
use lon_core::addr::{DestAddr, DomainIndex, SourceAddr};
use lon_core::config::{decode_buffer_count, decode_buffer_size, ReadOnlyData};
use lon_queue::{Queue, QueueError};

use crate::net::npdu::PduType;

// ═══════════════════════════════════════════════════════════════════════════
// DESTINATION PACKING
// ═══════════════════════════════════════════════════════════════════════════

const DEST_AREA: usize = 7;

fn pack_dest(dest: &DestAddr) -> (u8, [u8; DEST_AREA]) {
    let mut area = [0u8; DEST_AREA];
    let tag = match *dest {
        DestAddr::Broadcast { subnet } => {
            area[0] = subnet;
            0
        }
        DestAddr::Multicast { group } => {
            area[0] = group;
            1
        }
        DestAddr::SubnetNode { subnet, node } => {
            area[0] = subnet;
            area[1] = node;
            2
        }
        DestAddr::MulticastAck { subnet, node, group, member } => {
            area[0] = subnet;
            area[1] = node;
            area[2] = group;
            area[3] = member;
            3
        }
        DestAddr::UniqueId { subnet, unique_id } => {
            area[0] = subnet;
            area[1..7].copy_from_slice(&unique_id);
            4
        }
    };
    (tag, area)
}

fn unpack_dest(tag: u8, area: &[u8]) -> Option<DestAddr> {
    Some(match tag {
        0 => DestAddr::Broadcast { subnet: area[0] },
        1 => DestAddr::Multicast { group: area[0] },
        2 => DestAddr::SubnetNode { subnet: area[0], node: area[1] },
        3 => DestAddr::MulticastAck {
            subnet: area[0],
            node: area[1],
            group: area[2],
            member: area[3],
        },
        4 => {
            let mut unique_id = [0u8; 6];
            unique_id.copy_from_slice(&area[1..7]);
            DestAddr::UniqueId { subnet: area[0], unique_id }
        }
        _ => return None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// APPLICATION → NETWORK
// ═══════════════════════════════════════════════════════════════════════════

/// A send request as the application or transport layer enqueues it.
///
/// Slot layout: `[0]` version, `[1]` pdu type, `[2]` domain index,
/// `[3]` flags, `[4]` delta backlog, `[5]` destination tag, `[6..13]`
/// destination, `[13..15]` PDU size; the enclosed PDU follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NwSendRequest {
    pub version: u8,
    pub pdu_type: PduType,
    pub domain_index: DomainIndex,
    /// Clear for retry-class replies: those go out even unconfigured and
    /// fail silently on an invalid domain row.
    pub drop_if_unconfigured: bool,
    pub alt_path: bool,
    pub delta_bl: u8,
    pub dest: DestAddr,
    pub pdu_size: u16,
}

const FLAG_DROP_IF_UNCONFIGURED: u8 = 0x01;
const FLAG_ALT_PATH: u8 = 0x02;

impl NwSendRequest {
    pub const WIRE_LEN: usize = 15;

    pub fn write_to(&self, slot: &mut [u8]) {
        slot[0] = self.version;
        slot[1] = self.pdu_type.bits();
        slot[2] = self.domain_index.to_byte();
        slot[3] = u8::from(self.drop_if_unconfigured) * FLAG_DROP_IF_UNCONFIGURED
            | u8::from(self.alt_path) * FLAG_ALT_PATH;
        slot[4] = self.delta_bl;
        let (tag, area) = pack_dest(&self.dest);
        slot[5] = tag;
        slot[6..13].copy_from_slice(&area);
        LittleEndian::write_u16(&mut slot[13..15], self.pdu_size);
    }

    pub fn read_from(slot: &[u8]) -> Option<Self> {
        let dest = unpack_dest(slot[5], &slot[6..13])?;
        Some(Self {
            version: slot[0],
            pdu_type: PduType::from_bits(slot[1]),
            domain_index: DomainIndex::from_byte(slot[2]),
            drop_if_unconfigured: slot[3] & FLAG_DROP_IF_UNCONFIGURED != 0,
            alt_path: slot[3] & FLAG_ALT_PATH != 0,
            delta_bl: slot[4],
            dest,
            pdu_size: LittleEndian::read_u16(&slot[13..15]),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NETWORK → LINK
// ═══════════════════════════════════════════════════════════════════════════

/// Transmit parameters ahead of the NPDU in the link output queues.
///
/// Slot layout: `[0]` flags, `[1]` delta backlog, `[2..4]` NPDU size.
/// Priority is implied by which of the two queues the slot sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LkSendParam {
    pub alt_path: bool,
    pub delta_bl: u8,
    pub pdu_size: u16,
}

impl LkSendParam {
    pub const WIRE_LEN: usize = 4;

    pub fn write_to(&self, slot: &mut [u8]) {
        slot[0] = u8::from(self.alt_path);
        slot[1] = self.delta_bl;
        LittleEndian::write_u16(&mut slot[2..4], self.pdu_size);
    }

    pub fn read_from(slot: &[u8]) -> Self {
        Self {
            alt_path: slot[0] != 0,
            delta_bl: slot[1],
            pdu_size: LittleEndian::read_u16(&slot[2..4]),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LINK → NETWORK
// ═══════════════════════════════════════════════════════════════════════════

/// Receive parameters ahead of the NPDU in the inbound network queue.
///
/// Slot layout: `[0]` flags, `[1]` reserved, `[2..4]` NPDU size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NwRxParam {
    pub priority: bool,
    pub alt_path: bool,
    pub pdu_size: u16,
}

const FLAG_PRIORITY: u8 = 0x01;

impl NwRxParam {
    pub const WIRE_LEN: usize = 4;

    pub fn write_to(&self, slot: &mut [u8]) {
        slot[0] = u8::from(self.priority) * FLAG_PRIORITY
            | u8::from(self.alt_path) * FLAG_ALT_PATH;
        slot[1] = 0;
        LittleEndian::write_u16(&mut slot[2..4], self.pdu_size);
    }

    pub fn read_from(slot: &[u8]) -> Self {
        Self {
            priority: slot[0] & FLAG_PRIORITY != 0,
            alt_path: slot[0] & FLAG_ALT_PATH != 0,
            pdu_size: LittleEndian::read_u16(&slot[2..4]),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NETWORK → APPLICATION / TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════

/// A delivered PDU as the application or transport layer dequeues it.
///
/// Slot layout: `[0..2]` source subnet/node, `[2]` domain index, `[3]`
/// destination tag, `[4..11]` destination, `[11]` flags, `[12]` protocol
/// version, `[13..15]` PDU size; the enclosed PDU follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub source: SourceAddr,
    /// Matched domain row, or flex.
    pub domain_index: DomainIndex,
    pub dest: DestAddr,
    pub priority: bool,
    pub alt_path: bool,
    pub version: u8,
    pub pdu_size: u16,
}

impl Delivery {
    pub const WIRE_LEN: usize = 15;

    pub fn write_to(&self, slot: &mut [u8]) {
        slot[0] = self.source.subnet;
        slot[1] = self.source.node;
        slot[2] = self.domain_index.to_byte();
        let (tag, area) = pack_dest(&self.dest);
        slot[3] = tag;
        slot[4..11].copy_from_slice(&area);
        slot[11] = u8::from(self.priority) * FLAG_PRIORITY
            | u8::from(self.alt_path) * FLAG_ALT_PATH;
        slot[12] = self.version;
        LittleEndian::write_u16(&mut slot[13..15], self.pdu_size);
    }

    pub fn read_from(slot: &[u8]) -> Option<Self> {
        let dest = unpack_dest(slot[3], &slot[4..11])?;
        Some(Self {
            source: SourceAddr { subnet: slot[0], node: slot[1] },
            domain_index: DomainIndex::from_byte(slot[2]),
            dest,
            priority: slot[11] & FLAG_PRIORITY != 0,
            alt_path: slot[11] & FLAG_ALT_PATH != 0,
            version: slot[12],
            pdu_size: LittleEndian::read_u16(&slot[13..15]),
        })
    }
}

/// Send completion event, queued toward the application for every APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub success: bool,
}

impl CompletionEvent {
    pub const WIRE_LEN: usize = 1;

    pub fn write_to(&self, slot: &mut [u8]) {
        slot[0] = u8::from(self.success);
    }

    pub fn read_from(slot: &[u8]) -> Self {
        Self { success: slot[0] != 0 }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANNELS
// ═══════════════════════════════════════════════════════════════════════════

/// Every queue between the application and the wire, owned in one place
/// and lent to the layers each tick.
pub struct Channels {
    /// Application/transport → network, non-priority.
    pub nw_out: Queue,
    /// Application/transport → network, priority.
    pub nw_out_pri: Queue,
    /// Network → link, non-priority.
    pub lk_out: Queue,
    /// Network → link, priority.
    pub lk_out_pri: Queue,
    /// Link → network.
    pub nw_in: Queue,
    /// Network → application.
    pub app_in: Queue,
    /// Network → transport/session/authentication.
    pub tsa_in: Queue,
    /// Network → application completion events.
    pub completions: Queue,
}

impl Channels {
    /// Allocate the full bundle from the configuration sizing codes.
    pub fn allocate(ro: &ReadOnlyData) -> Result<Self, QueueError> {
        let nw_in_buf = usize::from(decode_buffer_size(ro.nw_in_buf_size_code));
        let nw_out_buf = usize::from(decode_buffer_size(ro.nw_out_buf_size_code));
        let app_buf = usize::from(decode_buffer_size(ro.app_buf_size_code));

        let nw_in_cnt = usize::from(decode_buffer_count(ro.nw_in_q_cnt_code));
        let nw_out_cnt = usize::from(decode_buffer_count(ro.nw_out_q_cnt_code));
        let nw_out_pri_cnt = usize::from(decode_buffer_count(ro.nw_out_pri_q_cnt_code));
        let app_in_cnt = usize::from(decode_buffer_count(ro.app_in_q_cnt_code));
        let tsa_in_cnt = usize::from(decode_buffer_count(ro.tsa_in_q_cnt_code));

        Ok(Self {
            nw_out: Queue::new(NwSendRequest::WIRE_LEN + nw_out_buf, nw_out_cnt)?,
            nw_out_pri: Queue::new(NwSendRequest::WIRE_LEN + nw_out_buf, nw_out_pri_cnt)?,
            lk_out: Queue::new(LkSendParam::WIRE_LEN + nw_out_buf, nw_out_cnt)?,
            lk_out_pri: Queue::new(LkSendParam::WIRE_LEN + nw_out_buf, nw_out_pri_cnt)?,
            nw_in: Queue::new(NwRxParam::WIRE_LEN + nw_in_buf, nw_in_cnt)?,
            app_in: Queue::new(Delivery::WIRE_LEN + app_buf, app_in_cnt)?,
            tsa_in: Queue::new(Delivery::WIRE_LEN + nw_in_buf, tsa_in_cnt)?,
            completions: Queue::new(CompletionEvent::WIRE_LEN, app_in_cnt)?,
        })
    }

    /// Enqueue a send request with its PDU. Returns false when the target
    /// queue is full or the PDU does not fit a slot.
    pub fn submit(&mut self, req: &NwSendRequest, pdu: &[u8], priority: bool) -> bool {
        let q = if priority { &mut self.nw_out_pri } else { &mut self.nw_out };
        if pdu.len() != usize::from(req.pdu_size) {
            return false;
        }
        match q.tail() {
            Some(slot) if slot.len() >= NwSendRequest::WIRE_LEN + pdu.len() => {
                req.write_to(slot);
                slot[NwSendRequest::WIRE_LEN..NwSendRequest::WIRE_LEN + pdu.len()]
                    .copy_from_slice(pdu);
                q.commit_tail();
                true
            }
            _ => false,
        }
    }

    /// Dequeue the next application delivery, if any.
    pub fn next_app_delivery(&mut self) -> Option<(Delivery, alloc::vec::Vec<u8>)> {
        Self::pop_delivery(&mut self.app_in)
    }

    /// Dequeue the next transport/session delivery, if any.
    pub fn next_tsa_delivery(&mut self) -> Option<(Delivery, alloc::vec::Vec<u8>)> {
        Self::pop_delivery(&mut self.tsa_in)
    }

    /// Dequeue the next completion event, if any.
    pub fn next_completion(&mut self) -> Option<CompletionEvent> {
        let event = CompletionEvent::read_from(self.completions.peek()?);
        self.completions.drop_head();
        Some(event)
    }

    fn pop_delivery(q: &mut Queue) -> Option<(Delivery, alloc::vec::Vec<u8>)> {
        let slot = q.peek()?;
        let delivery = Delivery::read_from(slot)?;
        let size = usize::from(delivery.pdu_size);
        let pdu = slot[Delivery::WIRE_LEN..Delivery::WIRE_LEN + size].to_vec();
        q.drop_head();
        Some((delivery, pdu))
    }
}
