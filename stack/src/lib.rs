//! LON stack core wiring.
//!
//! [`Stack`] bundles the link layer, the network layer, the inter-layer
//! queues and the persistent segment manager into one context and pumps
//! them from a cooperative scheduler:
//!
//! ```notrust
//! reset:    link up (unique-id probe) → network up → restore image
//! run_once: link.receive → net.receive → net.send → link.send → commit
//! shutdown: flush dirty segments → close interfaces
//! ```
//!
//! The embedding supplies the host seams (a [`Clock`]/[`Sleeper`], the
//! [`LonLink`] interfaces, and a [`FlashDevice`]) and exchanges traffic
//! through the queue endpoints re-exported here.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod codecs;
mod stack;

pub use stack::{Stack, StackConfig};

// The application-facing surface of the underlying crates.
pub use lon_core::addr::{DestAddr, DomainEntry, DomainIndex, SourceAddr, UniqueId};
pub use lon_core::config::{ConfigData, GroupEntry, NodeState, ReadOnlyData};
pub use lon_core::stats::{NodeStats, StatId};
pub use lon_core::time::{Clock, Sleeper};
pub use lon_network::link::{LinkCaps, LinkError, LonLink};
pub use lon_network::net::npdu::PduType;
pub use lon_network::records::{CompletionEvent, Delivery, NwSendRequest};
pub use lon_persistent::{FlashDevice, PersistenceError, SegmentType};
