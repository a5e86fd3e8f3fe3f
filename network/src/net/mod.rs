//! Network layer (L3).
//!
//! Outbound: picks the highest-priority pending send request, encodes the
//! NPDU header from the node's domain table, and hands the frame to the
//! link queues. Inbound: decodes the NPDU, matches the domain, applies
//! the addressing and configuration-state filters, and demultiplexes into
//! the application or transport queue.
//!
//! Both directions run as cooperative pump steps over the shared
//! [`Channels`](crate::records::Channels) bundle; backpressure is a
//! skipped tick, never a lost slot.

pub mod npdu;
mod receive;
mod send;

use lon_core::config::{decode_buffer_count, ReadOnlyData};
use log::error;

use npdu::DomainId;

/// Minimum outbound queue depths for a functioning layer.
const MIN_NW_OUT_DEPTH: u16 = 2;
const MIN_NW_OUT_PRI_DEPTH: u16 = 1;

/// The network layer.
pub struct NetworkLayer {
    reset_ok: bool,
    /// Domain id of the last flex-domain delivery; flex-domain sends echo
    /// it back, since no domain table row applies.
    flex_domain: DomainId,
}

impl NetworkLayer {
    pub const fn new() -> Self {
        Self {
            reset_ok: false,
            flex_domain: DomainId::EMPTY,
        }
    }

    /// Validate the configured queue geometry and bring the layer up.
    ///
    /// The queues themselves live in the channel bundle; this checks the
    /// decoded depths meet the layer's minimums.
    pub fn reset(&mut self, ro: &ReadOnlyData) {
        self.reset_ok = false;
        self.flex_domain = DomainId::EMPTY;

        let out_depth = decode_buffer_count(ro.nw_out_q_cnt_code);
        let out_pri_depth = decode_buffer_count(ro.nw_out_pri_q_cnt_code);
        if out_depth < MIN_NW_OUT_DEPTH {
            error!("net: outbound queue depth {} below minimum {}", out_depth, MIN_NW_OUT_DEPTH);
            return;
        }
        if out_pri_depth < MIN_NW_OUT_PRI_DEPTH {
            error!(
                "net: priority outbound queue depth {} below minimum {}",
                out_pri_depth, MIN_NW_OUT_PRI_DEPTH
            );
            return;
        }
        self.reset_ok = true;
    }

    /// Whether the last reset completed.
    #[inline]
    pub fn is_reset_ok(&self) -> bool {
        self.reset_ok
    }
}

impl Default for NetworkLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_accepts_default_geometry() {
        let mut layer = NetworkLayer::new();
        layer.reset(&ReadOnlyData::with_unique_id([0; 6]));
        assert!(layer.is_reset_ok());
    }

    #[test]
    fn test_reset_rejects_shallow_outbound_queue() {
        let mut ro = ReadOnlyData::with_unique_id([0; 6]);
        ro.nw_out_q_cnt_code = 1; // depth 1 < 2
        let mut layer = NetworkLayer::new();
        layer.reset(&ro);
        assert!(!layer.is_reset_ok());
    }

    #[test]
    fn test_reset_rejects_missing_priority_queue() {
        let mut ro = ReadOnlyData::with_unique_id([0; 6]);
        ro.nw_out_pri_q_cnt_code = 0; // depth 0 < 1
        let mut layer = NetworkLayer::new();
        layer.reset(&ro);
        assert!(!layer.is_reset_ok());
    }
}
