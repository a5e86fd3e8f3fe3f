//! LON data link and network layers.
//!
//! # Architecture
//!
//! The crate is split along the layer boundary:
//!
//! - [`link`], the L2 side: SICB framing to the transceiver, LPDU headers, CRC-16,
//!   the dual priority/non-priority output queues, and power-line
//!   transceiver housekeeping.
//! - [`net`], the L3 side: NPDU encode/decode, domain matching, the flex-domain
//!   policy, and demultiplexing into the application and transport queues.
//! - [`records`]: the fixed-layout records carried in the inter-layer
//!   queue slots, plus the [`records::Channels`] bundle that owns every
//!   queue between the application and the wire.
//!
//! Both layers are pumped cooperatively: the embedding calls
//! `send`/`receive` on each layer in a round-robin loop and nothing here
//! blocks outside of link reset.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod link;
pub mod net;
pub mod records;

#[cfg(feature = "standalone-alloc")]
mod standalone_alloc {
    //! Global allocator for bare-metal builds without a hosting runtime.
    //! The embedding must call [`init_heap`] exactly once before any
    //! allocation.

    use linked_list_allocator::LockedHeap;

    #[global_allocator]
    static HEAP: LockedHeap = LockedHeap::empty();

    /// Hand the allocator its arena.
    ///
    /// # Safety
    /// `start..start + size` must be writable, unused memory.
    pub unsafe fn init_heap(start: *mut u8, size: usize) {
        HEAP.lock().init(start, size);
    }
}

#[cfg(feature = "standalone-alloc")]
pub use standalone_alloc::init_heap;

pub use link::{LinkCaps, LinkError, LinkLayer, LonLink};
pub use net::NetworkLayer;
pub use records::Channels;
