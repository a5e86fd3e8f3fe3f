//! The segment manager: transactional store/restore plus guard-band
//! commit batching.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::{debug, error, warn};
use spin::Mutex;

use lon_core::time::{Clock, Sleeper};

use crate::hal::{FlashDevice, FlashError};
use crate::header::{PersistenceHeader, CURRENT_VERSION, HEADER_LEN, HEADER_SIGNATURE};
use crate::header::compute_checksum;
use crate::segment::{SegmentEntry, SegmentMap, SegmentType};
use crate::tx::{TransactionRecord, TX_RECORD_LEN};

/// Pause between segment burns, respecting flash-driver timing.
const INTER_SEGMENT_PAUSE_MS: u32 = 20;

/// Persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// Stored data is absent, torn, or fails validation.
    DataFailure,
    /// The flash device failed.
    Flash(FlashError),
    /// No serializer registered for the segment.
    NotInitialized,
    /// Serialized payload exceeds the segment's reservation.
    TooLarge { size: usize, max: usize },
    /// The flash region cannot hold the segment layout.
    RegionTooSmall,
}

impl core::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PersistenceError::DataFailure => write!(f, "persistent data invalid"),
            PersistenceError::Flash(e) => write!(f, "flash: {}", e),
            PersistenceError::NotInitialized => write!(f, "segment handler not installed"),
            PersistenceError::TooLarge { size, max } => {
                write!(f, "payload of {} bytes exceeds segment reservation {}", size, max)
            }
            PersistenceError::RegionTooSmall => write!(f, "flash region too small for layout"),
        }
    }
}

impl From<FlashError> for PersistenceError {
    fn from(e: FlashError) -> Self {
        PersistenceError::Flash(e)
    }
}

/// Serializer seam each persisted segment registers.
pub trait SegmentCodec {
    /// Append the segment's current payload to `out`.
    fn serialize(&self, out: &mut Vec<u8>);

    /// Adopt a restored payload.
    fn deserialize(&mut self, data: &[u8]) -> Result<(), PersistenceError>;
}

const SEG_COUNT: usize = SegmentType::ALL.len();

/// Transactional, checksummed segment persistence with guard-band
/// batching.
pub struct SegmentManager<F: FlashDevice> {
    /// The flash device is single-instance; every commit takes the lock,
    /// opens, burns, closes.
    flash: Mutex<F>,
    map: SegmentMap,
    app_signature: u32,
    guard_band_ms: u64,
    codecs: [Option<Box<dyn SegmentCodec>>; SEG_COUNT],
    dirty: [bool; SEG_COUNT],
    commit_now: bool,
    last_update: Option<u64>,
}

impl<F: FlashDevice> SegmentManager<F> {
    pub fn new(flash: F, app_signature: u32, guard_band_ms: u64) -> Result<Self, PersistenceError> {
        let map = SegmentMap::build(&flash.info()).ok_or(PersistenceError::RegionTooSmall)?;
        Ok(Self {
            flash: Mutex::new(flash),
            map,
            app_signature,
            guard_band_ms,
            codecs: [None, None, None, None, None, None, None],
            dirty: [false; SEG_COUNT],
            commit_now: false,
            last_update: None,
        })
    }

    /// Install the serializer for one segment.
    pub fn register_codec(&mut self, seg: SegmentType, codec: Box<dyn SegmentCodec>) {
        self.codecs[seg.index()] = Some(codec);
    }

    /// The computed layout, for diagnostics.
    pub fn map(&self) -> &SegmentMap {
        &self.map
    }

    /// Recover the flash device (used by reboot-style tests and
    /// shutdown paths).
    pub fn into_flash(self) -> F {
        self.flash.into_inner()
    }

    /// Lock the underlying device, for diagnostics and raw
    /// network-management reads.
    pub fn flash(&self) -> spin::MutexGuard<'_, F> {
        self.flash.lock()
    }

    /// Whether the segment's last lifecycle left it mid-transaction
    /// (equivalently: whether its stored data is invalid).
    pub fn is_in_transaction(&self, seg: SegmentType) -> Result<bool, PersistenceError> {
        let entry = *self.map.entry(seg);
        let mut flash = self.flash.lock();
        flash.open()?;
        let mut raw = [0u8; TX_RECORD_LEN];
        let result = flash.read(entry.tx_offset, &mut raw);
        flash.close();
        result?;
        Ok(!TransactionRecord::read_from(&raw).is_valid())
    }

    /// Restore one segment through its registered deserializer.
    ///
    /// Any validation or device failure reports `DataFailure`; the caller
    /// treats the segment as absent and proceeds with defaults.
    pub fn restore(&mut self, seg: SegmentType) -> Result<(), PersistenceError> {
        let entry = *self.map.entry(seg);
        let app_signature = self.app_signature;
        let codec = self.codecs[seg.index()]
            .as_mut()
            .ok_or(PersistenceError::NotInitialized)?;

        let payload = {
            let mut flash = self.flash.lock();
            if flash.open().is_err() {
                return Err(PersistenceError::DataFailure);
            }
            let result = Self::read_validated(&mut *flash, &entry, app_signature);
            flash.close();
            result?
        };
        codec.deserialize(&payload)
    }

    fn read_validated(
        flash: &mut F,
        entry: &SegmentEntry,
        app_signature: u32,
    ) -> Result<Vec<u8>, PersistenceError> {
        let mut tx_raw = [0u8; TX_RECORD_LEN];
        if flash.read(entry.tx_offset, &mut tx_raw).is_err() {
            return Err(PersistenceError::DataFailure);
        }
        if !TransactionRecord::read_from(&tx_raw).is_valid() {
            debug!("persist: segment at {:#x} is mid-transaction", entry.segment_start);
            return Err(PersistenceError::DataFailure);
        }

        let mut hdr_raw = [0u8; HEADER_LEN];
        if flash.read(entry.data_offset, &mut hdr_raw).is_err() {
            return Err(PersistenceError::DataFailure);
        }
        let hdr = PersistenceHeader::read_from(&hdr_raw);
        if hdr.signature != HEADER_SIGNATURE
            || hdr.version > CURRENT_VERSION
            || u32::from(hdr.length) > entry.max_payload()
        {
            debug!("persist: header rejected at {:#x}", entry.data_offset);
            return Err(PersistenceError::DataFailure);
        }
        // A zero application signature is the wildcard: accept any stored
        // identity and skip the checksum.
        if app_signature != 0 {
            if hdr.app_signature != app_signature {
                debug!("persist: application signature mismatch");
                return Err(PersistenceError::DataFailure);
            }
        }

        let mut payload = alloc::vec![0u8; usize::from(hdr.length)];
        if flash
            .read(entry.data_offset + HEADER_LEN as u32, &mut payload)
            .is_err()
        {
            return Err(PersistenceError::DataFailure);
        }
        if app_signature != 0 && compute_checksum(&payload) != hdr.checksum {
            debug!("persist: payload checksum mismatch");
            return Err(PersistenceError::DataFailure);
        }
        Ok(payload)
    }

    /// Serialize and burn one segment through the full transaction
    /// sequence.
    ///
    /// On a device failure the transaction is deliberately left open:
    /// the erase already destroyed the previous image, and an open
    /// transaction is what tells the next boot so.
    pub fn store(&mut self, seg: SegmentType) -> Result<(), PersistenceError> {
        let entry = *self.map.entry(seg);
        let codec = self.codecs[seg.index()]
            .as_ref()
            .ok_or(PersistenceError::NotInitialized)?;

        let mut payload = Vec::new();
        codec.serialize(&mut payload);
        if payload.len() > entry.max_payload() as usize {
            return Err(PersistenceError::TooLarge {
                size: payload.len(),
                max: entry.max_payload() as usize,
            });
        }
        let hdr = PersistenceHeader::for_payload(&payload, self.app_signature);

        let mut flash = self.flash.lock();
        flash.open()?;
        let result = Self::burn(&mut *flash, &entry, &hdr, &payload);
        flash.close();
        if result.is_err() {
            warn!("persist: store of {:?} failed, segment left in-transaction", seg);
        }
        result
    }

    fn burn(
        flash: &mut F,
        entry: &SegmentEntry,
        hdr: &PersistenceHeader,
        payload: &[u8],
    ) -> Result<(), PersistenceError> {
        // Enter transaction: a 1→0 overwrite of whatever record is there.
        let mut tx_raw = [0u8; TX_RECORD_LEN];
        TransactionRecord::entered().write_to(&mut tx_raw);
        flash.write(entry.tx_offset, &tx_raw)?;

        // Open for write: erase everything the segment reserves. The
        // erased record reads invalid, so the segment stays
        // in-transaction throughout.
        let needed = (HEADER_LEN + payload.len()) as u32;
        let span = TX_RECORD_LEN as u32 + needed.max(entry.max_data_size);
        erase_covering(flash, entry.tx_offset, span)?;

        let mut hdr_raw = [0u8; HEADER_LEN];
        hdr.write_to(&mut hdr_raw);
        write_split(flash, entry.data_offset, &hdr_raw)?;
        write_split(flash, entry.data_offset + HEADER_LEN as u32, payload)?;

        // Exit transaction: 1→0 from the erased record.
        TransactionRecord::committed().write_to(&mut tx_raw);
        flash.write(entry.tx_offset, &tx_raw)?;
        Ok(())
    }

    // ─── Guard-band batching ────────────────────────────────────────────

    /// Mark a segment dirty; the next expired guard band commits it.
    pub fn set_commit_flag(&mut self, seg: SegmentType) {
        self.dirty[seg.index()] = true;
    }

    /// (Re)arm the guard band from now.
    pub fn start_commit_timer(&mut self, clock: &dyn Clock) {
        self.last_update = Some(clock.tick_count());
    }

    /// Force the next tick to commit regardless of the guard band, for
    /// reset and shutdown paths.
    pub fn request_flush(&mut self) {
        self.commit_now = true;
    }

    /// Any segment awaiting commit?
    pub fn has_pending(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    /// The commit check: burn every dirty segment once the guard band
    /// has elapsed (or a flush was requested).
    pub fn commit_tick(&mut self, clock: &dyn Clock, sleeper: &dyn Sleeper) {
        if !self.has_pending() {
            self.commit_now = false;
            return;
        }
        let due = self.commit_now
            || self.last_update.is_some_and(|last| {
                clock.tick_count().wrapping_sub(last) >= clock.ms_to_ticks(self.guard_band_ms)
            });
        if !due {
            return;
        }

        let mut first = true;
        for seg in SegmentType::ALL {
            if !self.dirty[seg.index()] {
                continue;
            }
            if !first {
                sleeper.sleep_ms(INTER_SEGMENT_PAUSE_MS);
            }
            first = false;
            if let Err(e) = self.store(seg) {
                error!("persist: commit of {:?} failed: {}", seg, e);
            }
            self.dirty[seg.index()] = false;
        }
        self.commit_now = false;
        self.last_update = None;
    }
}

/// Erase every block covering `[start, start + len)`.
fn erase_covering<F: FlashDevice>(flash: &mut F, start: u32, len: u32) -> Result<(), FlashError> {
    let block = flash.info().block_size;
    let mut offset = start / block * block;
    let end = start + len;
    while offset < end {
        flash.erase_block(offset)?;
        offset += block;
    }
    Ok(())
}

/// Program `data` at `offset`, split at each block boundary.
fn write_split<F: FlashDevice>(
    flash: &mut F,
    mut offset: u32,
    mut data: &[u8],
) -> Result<(), FlashError> {
    let block = flash.info().block_size;
    while !data.is_empty() {
        let room = (block - offset % block) as usize;
        let n = data.len().min(room);
        flash.write(offset, &data[..n])?;
        offset += n as u32;
        data = &data[n..];
    }
    Ok(())
}
