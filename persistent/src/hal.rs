//! Flash HAL seam.
//!
//! The persistence layer drives any storage that offers whole-block
//! erases (all bits back to 1) and 1→0 programming writes, the NOR-style
//! primitive. The device is opened for each commit and closed again; the
//! segment manager serializes access through a single-instance lock.

/// Device geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashInfo {
    /// Usable region size in bytes.
    pub region_size: u32,
    /// Erase block size in bytes. Region size is a multiple of it.
    pub block_size: u32,
}

impl FlashInfo {
    /// Number of erase blocks in the region.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.region_size / self.block_size
    }
}

/// Flash HAL errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Offset or length outside the region.
    OutOfBounds { offset: u32, len: u32 },
    /// The device rejected or failed the operation.
    Device,
    /// The device is not open.
    NotOpen,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::OutOfBounds { offset, len } => {
                write!(f, "flash access {}+{} out of bounds", offset, len)
            }
            FlashError::Device => write!(f, "flash device failure"),
            FlashError::NotOpen => write!(f, "flash device not open"),
        }
    }
}

/// Block-erasable storage primitive.
pub trait FlashDevice {
    /// Device geometry. Stable for the device lifetime.
    fn info(&self) -> FlashInfo;

    /// Open the device for a burst of operations.
    fn open(&mut self) -> Result<(), FlashError>;

    /// Read `dst.len()` bytes at `offset`.
    fn read(&mut self, offset: u32, dst: &mut [u8]) -> Result<(), FlashError>;

    /// Program bytes at `offset`. Only 1→0 transitions take effect; the
    /// stored result is `old & new`. Callers erase first when they need
    /// fresh ones.
    fn write(&mut self, offset: u32, src: &[u8]) -> Result<(), FlashError>;

    /// Erase the whole block containing `offset`, restoring every bit in
    /// it to 1.
    fn erase_block(&mut self, offset: u32) -> Result<(), FlashError>;

    /// Close the device after a burst of operations.
    fn close(&mut self);
}
