//! Compile-time platform/link/protocol selector sets.
//!
//! These mirror the build-time identity macros of the stack: closed enums
//! the embedding picks from at init. They gate which link binding is used
//! and which optional subsystems are present; they carry no runtime
//! behaviour of their own.

/// Target platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformId {
    Linux,
    Rtos,
    BareMetal,
}

/// Physical link binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkId {
    Ethernet,
    WiFi,
    /// MIP serial interface to an external transceiver.
    Mip,
    /// USB interface to an external transceiver.
    Usb,
}

/// Wire protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    LonIp,
    LonNative,
}

/// Security profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityId {
    V1,
    V2,
}

/// Interoperable self-installation profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsiId {
    None,
    Isi,
}

/// In-field update profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IupId {
    None,
    Iup,
}

impl LinkId {
    /// True for bindings that talk SICB to an external transceiver.
    #[inline]
    pub fn uses_serial_interface(self) -> bool {
        matches!(self, LinkId::Mip | LinkId::Usb)
    }
}
