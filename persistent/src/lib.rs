//! Transactional, checksummed segment persistence for the LON stack.
//!
//! The network image and application data survive power loss in
//! fixed-position *segments* of a raw block-erasable flash region. Every
//! segment is guarded by a two-word transaction record whose state
//! machine only ever moves bits 1→0 between erases, so an interruption at
//! any point leaves the segment detectably invalid rather than silently
//! torn.
//!
//! Writes are batched behind a *guard band*: mutations mark a segment
//! dirty, and only after the configured quiescent interval (or an
//! explicit flush at shutdown) does the commit tick serialize and burn
//! each dirty segment.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod hal;
pub mod header;
pub mod manager;
pub mod mem;
pub mod segment;
pub mod tx;

pub use hal::{FlashDevice, FlashError, FlashInfo};
pub use manager::{PersistenceError, SegmentCodec, SegmentManager};
pub use mem::MemFlash;
pub use segment::{SegmentEntry, SegmentMap, SegmentType};
