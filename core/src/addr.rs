//! LON addressing: unique ids, domains, and the destination address forms.
//!
//! A node belongs to up to two domains; each domain row pins the node's
//! subnet and 7-bit node number within that domain. A received frame whose
//! domain id matches neither row is handled in the *flex domain*, which is
//! only acceptable in constrained cases (see the network layer).

/// 6-byte globally unique device identifier (Neuron id).
pub type UniqueId = [u8; 6];

/// Maximum domain id length in bytes.
pub const MAX_DOMAIN_ID_LEN: usize = 6;

/// Sentinel domain index meaning "flex domain" (no configured row).
pub const FLEX_DOMAIN_INDEX: u8 = 0xFF;

/// Index into the node's domain table, or flex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainIndex {
    /// A configured domain table row (0 or 1).
    Row(u8),
    /// No row matched / explicitly flex.
    Flex,
}

impl DomainIndex {
    /// Decode from the byte form used in queue records.
    pub fn from_byte(raw: u8) -> Self {
        if raw == FLEX_DOMAIN_INDEX {
            DomainIndex::Flex
        } else {
            DomainIndex::Row(raw)
        }
    }

    /// Byte form used in queue records.
    pub fn to_byte(self) -> u8 {
        match self {
            DomainIndex::Row(i) => i,
            DomainIndex::Flex => FLEX_DOMAIN_INDEX,
        }
    }

    #[inline]
    pub fn is_flex(self) -> bool {
        matches!(self, DomainIndex::Flex)
    }
}

/// One row of the node's domain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainEntry {
    /// Domain id, left-justified; only `id_length` bytes are significant.
    pub id: [u8; MAX_DOMAIN_ID_LEN],
    /// Significant length of `id`: 0, 1, 3 or 6.
    pub id_length: u8,
    /// This node's subnet within the domain (1..=255; 0 is unassigned).
    pub subnet: u8,
    /// This node's node number within the domain (7 bits).
    pub node: u8,
    /// Row is not usable when set.
    pub invalid: bool,
}

impl DomainEntry {
    /// An unusable (invalid) row.
    pub const fn unassigned() -> Self {
        Self {
            id: [0; MAX_DOMAIN_ID_LEN],
            id_length: 0,
            subnet: 0,
            node: 0,
            invalid: true,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    /// True when this row's domain id equals `id` of length `len`.
    pub fn matches_id(&self, id: &[u8]) -> bool {
        self.is_valid()
            && usize::from(self.id_length) == id.len()
            && self.id[..id.len()] == *id
    }
}

/// Source address carried in every NPDU (bytes 1 and 2 of the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAddr {
    pub subnet: u8,
    /// 7-bit node number.
    pub node: u8,
}

/// Destination address forms, keyed by the NPDU `addrFmt` field.
///
/// `SubnetNode` and `MulticastAck` share `addrFmt = 2` on the wire and are
/// disambiguated by the source-node selector bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestAddr {
    /// Domain-wide (`subnet == 0`) or subnet-wide broadcast.
    Broadcast { subnet: u8 },
    /// Group-addressed (multicast).
    Multicast { group: u8 },
    /// A single node by subnet/node.
    SubnetNode { subnet: u8, node: u8 },
    /// Group acknowledgement: unicast back to a group member.
    MulticastAck {
        subnet: u8,
        node: u8,
        group: u8,
        member: u8,
    },
    /// A single node by unique id; `subnet` is a routing hint only.
    UniqueId { subnet: u8, unique_id: UniqueId },
}

impl DestAddr {
    /// The 2-bit `addrFmt` wire code for this form.
    pub fn addr_fmt(&self) -> u8 {
        match self {
            DestAddr::Broadcast { .. } => 0,
            DestAddr::Multicast { .. } => 1,
            DestAddr::SubnetNode { .. } | DestAddr::MulticastAck { .. } => 2,
            DestAddr::UniqueId { .. } => 3,
        }
    }

    /// Encoded length of the destination field in the NPDU header.
    pub fn wire_len(&self) -> usize {
        match self {
            DestAddr::Broadcast { .. } | DestAddr::Multicast { .. } => 1,
            DestAddr::SubnetNode { .. } => 2,
            DestAddr::MulticastAck { .. } => 4,
            DestAddr::UniqueId { .. } => 7,
        }
    }
}
