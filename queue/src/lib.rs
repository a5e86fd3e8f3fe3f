//! Inter-layer transport primitives for the LON stack core.
//!
//! Two building blocks live here:
//!
//! - [`Queue`]: a fixed-capacity ring of fixed-size entries. Every queue
//!   between two stack layers (network → link, link → network, network →
//!   application) is one of these. Single producer at the tail, single
//!   consumer at the head.
//! - [`RingBuffer`]: a byte-granular bounded ring used to decouple the
//!   link driver's serial byte stream from frame assembly.
//!
//! # Discipline
//!
//! Both types assume the cooperative single-threaded scheduling model of
//! the stack: the producer side and the consumer side run on the same
//! thread, never reentrantly. A threaded embedding must wrap each queue in
//! its own lock; the logical contract stays SPSC.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod queue;
pub mod ring;

pub use queue::{Queue, QueueError};
pub use ring::{RingBuffer, RingError, MAX_RING_CAPACITY};
