//! Node configuration and the LON buffer sizing codes.
//!
//! Buffer sizes and counts are stored in read-only data as 4-bit codes and
//! expanded through fixed tables at reset time. The tables follow the
//! Neuron convention: size code 0 and 15 both select the 255-byte maximum,
//! count code 0 means "no buffers".

use crate::addr::{DomainEntry, UniqueId};

/// Expansion table for 4-bit buffer *size* codes.
const BUFFER_SIZES: [u16; 16] = [
    255, 20, 21, 22, 24, 26, 30, 34, 42, 50, 66, 82, 114, 146, 210, 255,
];

/// Expansion table for 4-bit buffer *count* codes.
const BUFFER_COUNTS: [u16; 16] = [
    0, 1, 2, 3, 5, 7, 11, 15, 23, 31, 47, 63, 95, 127, 191, 255,
];

/// Expand a buffer size code to bytes.
#[inline]
pub fn decode_buffer_size(code: u8) -> u16 {
    BUFFER_SIZES[usize::from(code & 0x0F)]
}

/// Expand a buffer count code to a queue depth.
#[inline]
pub fn decode_buffer_count(code: u8) -> u16 {
    BUFFER_COUNTS[usize::from(code & 0x0F)]
}

/// Whether the node participates in the network yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not commissioned; only broadcast and unique-id traffic is accepted.
    Unconfigured,
    /// Commissioned into at least one domain.
    Configured,
}

impl NodeState {
    #[inline]
    pub fn is_configured(self) -> bool {
        matches!(self, NodeState::Configured)
    }
}

/// Factory-set identity and sizing codes.
///
/// Mirrors the on-wire read-only structure: the sizing fields hold 4-bit
/// codes, not byte counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOnlyData {
    pub unique_node_id: UniqueId,
    /// Node uses two domain table rows when set.
    pub two_domains: bool,
    /// Size code for inbound network buffers.
    pub nw_in_buf_size_code: u8,
    /// Size code for outbound network buffers.
    pub nw_out_buf_size_code: u8,
    /// Size code for application buffers.
    pub app_buf_size_code: u8,
    /// Count code for the inbound network queue.
    pub nw_in_q_cnt_code: u8,
    /// Count code for the outbound network queue.
    pub nw_out_q_cnt_code: u8,
    /// Count code for the outbound priority network queue.
    pub nw_out_pri_q_cnt_code: u8,
    /// Count code for the application inbound queue.
    pub app_in_q_cnt_code: u8,
    /// Count code for the transport/session inbound queue.
    pub tsa_in_q_cnt_code: u8,
}

impl ReadOnlyData {
    /// Conservative defaults used by the self-test binaries.
    pub const fn with_unique_id(unique_node_id: UniqueId) -> Self {
        Self {
            unique_node_id,
            two_domains: true,
            nw_in_buf_size_code: 10,  // 66 bytes
            nw_out_buf_size_code: 10, // 66 bytes
            app_buf_size_code: 8,     // 42 bytes
            nw_in_q_cnt_code: 3,      // 3 entries
            nw_out_q_cnt_code: 3,     // 3 entries
            nw_out_pri_q_cnt_code: 2, // 2 entries
            app_in_q_cnt_code: 3,     // 3 entries
            tsa_in_q_cnt_code: 3,     // 3 entries
        }
    }

    #[inline]
    pub fn domain_count(&self) -> usize {
        if self.two_domains {
            2
        } else {
            1
        }
    }
}

/// One group membership, tied to a domain table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    pub domain_index: u8,
    pub group: u8,
    /// This node's member number within the group.
    pub member: u8,
}

/// Maximum group memberships tracked per node.
pub const MAX_GROUPS: usize = 15;

/// The writable network image: domain table, group table, node state.
///
/// This structure is what the persistent segment manager checkpoints as
/// the `NetworkImage` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigData {
    pub domains: [DomainEntry; 2],
    pub groups: [Option<GroupEntry>; MAX_GROUPS],
    pub state: NodeState,
}

impl ConfigData {
    pub const fn unconfigured() -> Self {
        Self {
            domains: [DomainEntry::unassigned(), DomainEntry::unassigned()],
            groups: [None; MAX_GROUPS],
            state: NodeState::Unconfigured,
        }
    }

    /// True when the node is a member of `group` in domain row
    /// `domain_index`.
    pub fn is_group_member(&self, domain_index: u8, group: u8) -> bool {
        self.groups.iter().flatten().any(|g| {
            g.domain_index == domain_index && g.group == group
        })
    }

    /// Record a group membership. Returns false when the table is full.
    pub fn join_group(&mut self, entry: GroupEntry) -> bool {
        for slot in self.groups.iter_mut() {
            if slot.is_none() {
                *slot = Some(entry);
                return true;
            }
        }
        false
    }
}
