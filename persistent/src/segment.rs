//! Segment types and the flash layout map.
//!
//! Segments are laid out top-down from the end of the persistent region,
//! each start rounded down to an erase-block boundary so a segment's
//! erase cycle can never touch a neighbour. Offsets are computed once per
//! boot and stable for the process lifetime.

use crate::hal::FlashInfo;
use crate::header::HEADER_LEN;
use crate::tx::TX_RECORD_LEN;

/// The closed set of persisted segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    NetworkImage,
    SecurityII,
    NodeDefinition,
    ApplicationData,
    UniqueId,
    ConnectionTable,
    Isi,
}

impl SegmentType {
    /// Layout order, highest flash address first.
    pub const ALL: [SegmentType; 7] = [
        SegmentType::NetworkImage,
        SegmentType::SecurityII,
        SegmentType::NodeDefinition,
        SegmentType::ApplicationData,
        SegmentType::UniqueId,
        SegmentType::ConnectionTable,
        SegmentType::Isi,
    ];

    /// Stable index into per-segment state tables.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            SegmentType::NetworkImage => 0,
            SegmentType::SecurityII => 1,
            SegmentType::NodeDefinition => 2,
            SegmentType::ApplicationData => 3,
            SegmentType::UniqueId => 4,
            SegmentType::ConnectionTable => 5,
            SegmentType::Isi => 6,
        }
    }

    /// Reserved bytes for header plus payload.
    fn reserved_size(self) -> u32 {
        match self {
            SegmentType::NetworkImage => 1024,
            SegmentType::SecurityII => 512,
            SegmentType::NodeDefinition => 1024,
            SegmentType::ApplicationData => 2048,
            SegmentType::UniqueId => 64,
            SegmentType::ConnectionTable => 1024,
            SegmentType::Isi => 512,
        }
    }
}

/// One segment's place on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    /// Block-aligned start of the segment.
    pub segment_start: u32,
    /// Transaction record offset (equals the start).
    pub tx_offset: u32,
    /// First byte of header + payload.
    pub data_offset: u32,
    /// Reserved bytes for header + payload.
    pub max_data_size: u32,
}

impl SegmentEntry {
    /// Largest payload this segment can store.
    #[inline]
    pub fn max_payload(&self) -> u32 {
        self.max_data_size - HEADER_LEN as u32
    }
}

/// The computed layout of every segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentMap {
    entries: [SegmentEntry; SegmentType::ALL.len()],
}

impl SegmentMap {
    /// Lay the segments out for the given geometry.
    ///
    /// Returns `None` when the region cannot hold them all.
    pub fn build(info: &FlashInfo) -> Option<Self> {
        let mut entries = [SegmentEntry {
            segment_start: 0,
            tx_offset: 0,
            data_offset: 0,
            max_data_size: 0,
        }; SegmentType::ALL.len()];

        let mut next_end = info.region_size;
        for seg in SegmentType::ALL {
            let reserved = seg.reserved_size();
            let total = TX_RECORD_LEN as u32 + reserved;
            let start = next_end.checked_sub(total)? / info.block_size * info.block_size;
            entries[seg.index()] = SegmentEntry {
                segment_start: start,
                tx_offset: start,
                data_offset: start + TX_RECORD_LEN as u32,
                max_data_size: reserved,
            };
            next_end = start;
        }
        Some(Self { entries })
    }

    #[inline]
    pub fn entry(&self, seg: SegmentType) -> &SegmentEntry {
        &self.entries[seg.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> FlashInfo {
        FlashInfo { region_size: 64 * 1024, block_size: 4 * 1024 }
    }

    #[test]
    fn test_layout_is_top_down_and_aligned() {
        let map = SegmentMap::build(&info()).unwrap();
        let mut prev_start = info().region_size;
        for seg in SegmentType::ALL {
            let entry = map.entry(seg);
            assert_eq!(entry.segment_start % info().block_size, 0);
            assert!(entry.segment_start < prev_start, "{:?} not below predecessor", seg);
            prev_start = entry.segment_start;
        }
    }

    #[test]
    fn test_segments_do_not_overlap() {
        let map = SegmentMap::build(&info()).unwrap();
        for window in SegmentType::ALL.windows(2) {
            let higher = map.entry(window[0]);
            let lower = map.entry(window[1]);
            let lower_end =
                lower.tx_offset + TX_RECORD_LEN as u32 + lower.max_data_size;
            assert!(lower_end <= higher.segment_start);
        }
    }

    #[test]
    fn test_entry_offsets() {
        let map = SegmentMap::build(&info()).unwrap();
        for seg in SegmentType::ALL {
            let entry = map.entry(seg);
            assert_eq!(entry.tx_offset, entry.segment_start);
            assert_eq!(entry.data_offset, entry.segment_start + TX_RECORD_LEN as u32);
            assert!(entry.max_payload() > 0);
        }
    }

    #[test]
    fn test_too_small_region_refused() {
        let tiny = FlashInfo { region_size: 4 * 1024, block_size: 1024 };
        assert!(SegmentMap::build(&tiny).is_none());
    }

    #[test]
    fn test_offsets_stable_across_builds() {
        let first = SegmentMap::build(&info()).unwrap();
        let second = SegmentMap::build(&info()).unwrap();
        for seg in SegmentType::ALL {
            assert_eq!(first.entry(seg), second.entry(seg));
        }
    }
}
