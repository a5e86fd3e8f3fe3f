//! Link HAL seam.
//!
//! A [`LonLink`] is a framed byte pipe to one transceiver: USB, UART, or
//! anything else that moves SICB frames. The link layer opens each
//! configured link once at reset and closes it only at shutdown.

/// Interface capabilities the link layer keys behaviour off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCaps {
    /// Power-line transceiver: phase management, parameter probing, and
    /// the unique-id fetch at reset all apply.
    pub power_line: bool,
    /// The transceiver computes and validates the LPDU CRC itself.
    pub computes_crc: bool,
}

impl LinkCaps {
    /// A plain free-topology/TP interface that owns its CRC.
    pub const TP: LinkCaps = LinkCaps { power_line: false, computes_crc: true };
    /// A power-line interface.
    pub const PL: LinkCaps = LinkCaps { power_line: true, computes_crc: true };
}

/// Link HAL errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The device is not open.
    NotOpen,
    /// Opening the device failed.
    OpenFailed,
    /// A write was not accepted by the device.
    TxFailed,
    /// The device reported a receive-side fault.
    RxFailed,
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinkError::NotOpen => write!(f, "link not open"),
            LinkError::OpenFailed => write!(f, "link open failed"),
            LinkError::TxFailed => write!(f, "link write not accepted"),
            LinkError::RxFailed => write!(f, "link receive fault"),
        }
    }
}

/// A framed byte pipe to one transceiver.
pub trait LonLink {
    /// Open the device. Called once at link reset.
    fn open(&mut self) -> Result<(), LinkError>;

    /// Move pending received bytes into `dst` without blocking.
    ///
    /// Returns the byte count; zero means nothing pending. Partial frames
    /// are fine; reassembly happens above this seam.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize, LinkError>;

    /// Write one complete SICB frame.
    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Close the device. Called only at shutdown.
    fn close(&mut self);

    /// Static capabilities of this interface.
    fn caps(&self) -> LinkCaps;
}
