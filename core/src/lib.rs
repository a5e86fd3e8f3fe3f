//! Shared types for the LON (ISO/IEC 14908-1) stack core.
//!
//! Everything here is plain data used by more than one layer: addressing
//! and domain tables, node configuration and the LON buffer sizing codes,
//! telemetry counters, the host clock seam, and the compile-time selector
//! sets. No layer logic lives in this crate.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod addr;
pub mod config;
pub mod ident;
pub mod stats;
pub mod time;

pub use addr::{DestAddr, DomainEntry, DomainIndex, SourceAddr, UniqueId, FLEX_DOMAIN_INDEX};
pub use config::{
    decode_buffer_count, decode_buffer_size, ConfigData, GroupEntry, NodeState, ReadOnlyData,
};
pub use ident::{IsiId, IupId, LinkId, PlatformId, ProtocolId, SecurityId};
pub use stats::{NodeStats, StatId};
pub use time::{Clock, RepeatTimer, Sleeper};
