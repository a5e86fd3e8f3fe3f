//! NPDU wire codec.
//!
//! Header layout:
//!
//! ```notrust
//! MSB                                       LSB
//! +----------+----------+----------+----------+
//! | version  | addrFmt  | pduType  | domLen   |   byte 0
//! | (2 bits) | (2 bits) | (2 bits) | (2 bits) |
//! +----------+----------+----------+----------+
//! | source subnet                             |   byte 1 (0 in flex domain)
//! +----------+--------------------------------+
//! |   sel    | source node (7 bits)           |   byte 2 (0x80 in flex domain)
//! +----------+--------------------------------+
//! | destination address (1/1/2/4/7 bytes)     |
//! +-------------------------------------------+
//! | domain id (0/1/3/6 bytes)                 |
//! +-------------------------------------------+
//! | enclosed PDU                              |
//! +-------------------------------------------+
//! ```
//!
//! `addrFmt` 2 is shared by subnet/node unicast and group acknowledgement;
//! the source `sel` bit disambiguates (1 = subnet/node). The destination
//! node byte of both forms carries its own sel bit set to 1.
//!
//! The 2-bit domain length code expands through a table: 0→0, 1→1, 2→3,
//! 3→6. Code 3 decodes here like any other; whether a 6-byte id is
//! acceptable is the receive pipeline's decision, not the codec's.

use lon_core::addr::{DestAddr, SourceAddr, MAX_DOMAIN_ID_LEN};

/// The PDU enclosed in an NPDU, by 2-bit wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    Tpdu = 0,
    Apdu = 1,
    Spdu = 2,
    AuthPdu = 3,
}

impl PduType {
    /// Decode the 2-bit field. Total on its domain.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => PduType::Tpdu,
            1 => PduType::Apdu,
            2 => PduType::Spdu,
            _ => PduType::AuthPdu,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_apdu(self) -> bool {
        matches!(self, PduType::Apdu)
    }
}

/// A domain id with its significant length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainId {
    bytes: [u8; MAX_DOMAIN_ID_LEN],
    len: u8,
}

impl DomainId {
    /// The zero-length domain id.
    pub const EMPTY: DomainId = DomainId {
        bytes: [0; MAX_DOMAIN_ID_LEN],
        len: 0,
    };

    /// Build from raw bytes. Lengths above six are refused.
    pub fn new(id: &[u8]) -> Option<Self> {
        if id.len() > MAX_DOMAIN_ID_LEN {
            return None;
        }
        let mut bytes = [0; MAX_DOMAIN_ID_LEN];
        bytes[..id.len()].copy_from_slice(id);
        Some(Self {
            bytes,
            len: id.len() as u8,
        })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    #[inline]
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// NPDU codec failures. Per-packet only; the pipelines convert these to
/// telemetry and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpduError {
    /// Frame ended inside the header.
    Truncated,
    /// Domain id length not encodable (not 0, 1, 3 or 6).
    InvalidDomainLength { len: usize },
    /// Output buffer cannot hold the header.
    BufferTooSmall,
}

impl core::fmt::Display for NpduError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NpduError::Truncated => write!(f, "NPDU truncated inside header"),
            NpduError::InvalidDomainLength { len } => {
                write!(f, "domain id length {} not encodable", len)
            }
            NpduError::BufferTooSmall => write!(f, "output buffer too small for NPDU header"),
        }
    }
}

/// Encode a domain id byte length to the 2-bit wire code.
pub fn encode_domain_len(len: usize) -> Result<u8, NpduError> {
    match len {
        0 => Ok(0),
        1 => Ok(1),
        3 => Ok(2),
        6 => Ok(3),
        _ => Err(NpduError::InvalidDomainLength { len }),
    }
}

/// Expand the 2-bit wire code to a byte length.
#[inline]
pub fn decode_domain_len(code: u8) -> usize {
    const TABLE: [usize; 4] = [0, 1, 3, 6];
    TABLE[usize::from(code & 0x03)]
}

/// Source node byte: sel bit in the high position, node in the low seven.
#[inline]
pub fn source_node_byte(sel: bool, node: u8) -> u8 {
    (u8::from(sel) << 7) | (node & 0x7F)
}

/// A fully decoded NPDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedNpdu {
    pub version: u8,
    pub pdu_type: PduType,
    pub source: SourceAddr,
    /// The source selector bit as received.
    pub source_sel: bool,
    pub dest: DestAddr,
    pub domain: DomainId,
    /// Total header length; the enclosed PDU starts here.
    pub header_len: usize,
}

/// Decode an NPDU header from the start of `buf`.
///
/// The enclosed PDU is `buf[parsed.header_len..]`; sizing it against the
/// receive parameters is the caller's job.
pub fn decode(buf: &[u8]) -> Result<ParsedNpdu, NpduError> {
    if buf.len() < 3 {
        return Err(NpduError::Truncated);
    }
    let b0 = buf[0];
    let version = b0 >> 6;
    let addr_fmt = (b0 >> 4) & 0x03;
    let pdu_type = PduType::from_bits((b0 >> 2) & 0x03);
    let domain_len = decode_domain_len(b0 & 0x03);

    let source = SourceAddr {
        subnet: buf[1],
        node: buf[2] & 0x7F,
    };
    let source_sel = buf[2] & 0x80 != 0;

    // Destination field, indexed from the source subnet byte onward.
    let data = &buf[1..];
    let (dest, j) = match addr_fmt {
        0 => {
            if data.len() < 3 {
                return Err(NpduError::Truncated);
            }
            (DestAddr::Broadcast { subnet: data[2] }, 3)
        }
        1 => {
            if data.len() < 3 {
                return Err(NpduError::Truncated);
            }
            (DestAddr::Multicast { group: data[2] }, 3)
        }
        2 => {
            if source_sel {
                if data.len() < 4 {
                    return Err(NpduError::Truncated);
                }
                (
                    DestAddr::SubnetNode {
                        subnet: data[2],
                        node: data[3] & 0x7F,
                    },
                    4,
                )
            } else {
                if data.len() < 6 {
                    return Err(NpduError::Truncated);
                }
                (
                    DestAddr::MulticastAck {
                        subnet: data[2],
                        node: data[3] & 0x7F,
                        group: data[4],
                        member: data[5],
                    },
                    6,
                )
            }
        }
        _ => {
            if data.len() < 9 {
                return Err(NpduError::Truncated);
            }
            let mut unique_id = [0u8; 6];
            unique_id.copy_from_slice(&data[3..9]);
            (
                DestAddr::UniqueId {
                    subnet: data[2],
                    unique_id,
                },
                9,
            )
        }
    };

    if data.len() < j + domain_len {
        return Err(NpduError::Truncated);
    }
    let domain = DomainId::new(&data[j..j + domain_len]).ok_or(NpduError::Truncated)?;

    Ok(ParsedNpdu {
        version,
        pdu_type,
        source,
        source_sel,
        dest,
        domain,
        header_len: 1 + j + domain_len,
    })
}

impl ParsedNpdu {
    /// Encode this header into the start of `out`, returning its length.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, NpduError> {
        let domain_code = encode_domain_len(self.domain.len())?;
        let needed = 3 + self.dest.wire_len() + self.domain.len();
        if out.len() < needed {
            return Err(NpduError::BufferTooSmall);
        }

        out[0] = (self.version << 6)
            | (self.dest.addr_fmt() << 4)
            | (self.pdu_type.bits() << 2)
            | domain_code;
        out[1] = self.source.subnet;
        out[2] = source_node_byte(self.source_sel, self.source.node);

        let mut j = 3;
        match self.dest {
            DestAddr::Broadcast { subnet } => {
                out[j] = subnet;
                j += 1;
            }
            DestAddr::Multicast { group } => {
                out[j] = group;
                j += 1;
            }
            DestAddr::SubnetNode { subnet, node } => {
                out[j] = subnet;
                out[j + 1] = 0x80 | (node & 0x7F);
                j += 2;
            }
            DestAddr::MulticastAck {
                subnet,
                node,
                group,
                member,
            } => {
                out[j] = subnet;
                out[j + 1] = 0x80 | (node & 0x7F);
                out[j + 2] = group;
                out[j + 3] = member;
                j += 4;
            }
            DestAddr::UniqueId { subnet, unique_id } => {
                out[j] = subnet;
                out[j + 1..j + 7].copy_from_slice(&unique_id);
                j += 7;
            }
        }

        out[j..j + self.domain.len()].copy_from_slice(self.domain.as_slice());
        Ok(j + self.domain.len())
    }
}
