//! Built-in segment serializers.
//!
//! Two segment kinds are serialized by the stack itself: the network
//! image (the writable configuration) and the application data segment,
//! which delegates to handlers the application registers.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use lon_core::addr::DomainEntry;
use lon_core::config::{ConfigData, GroupEntry, NodeState, MAX_GROUPS};
use lon_persistent::{PersistenceError, SegmentCodec};

const DOMAIN_ENTRY_LEN: usize = 10;
const GROUP_ENTRY_LEN: usize = 4;
/// Encoded network image: state byte, two domain rows, the group table.
pub const NETWORK_IMAGE_LEN: usize = 1 + 2 * DOMAIN_ENTRY_LEN + MAX_GROUPS * GROUP_ENTRY_LEN;

/// Flat encoding of the writable network image.
pub fn encode_config(cfg: &ConfigData, out: &mut Vec<u8>) {
    out.push(u8::from(cfg.state.is_configured()));
    for row in &cfg.domains {
        out.extend_from_slice(&row.id);
        out.push(row.id_length);
        out.push(row.subnet);
        out.push(row.node);
        out.push(u8::from(row.invalid));
    }
    for slot in &cfg.groups {
        match slot {
            Some(g) => {
                out.push(1);
                out.push(g.domain_index);
                out.push(g.group);
                out.push(g.member);
            }
            None => out.extend_from_slice(&[0; GROUP_ENTRY_LEN]),
        }
    }
}

/// Inverse of [`encode_config`].
pub fn decode_config(data: &[u8]) -> Result<ConfigData, PersistenceError> {
    if data.len() != NETWORK_IMAGE_LEN {
        return Err(PersistenceError::DataFailure);
    }
    let mut cfg = ConfigData::unconfigured();
    cfg.state = if data[0] != 0 {
        NodeState::Configured
    } else {
        NodeState::Unconfigured
    };

    let mut at = 1;
    for row in cfg.domains.iter_mut() {
        let mut id = [0u8; 6];
        id.copy_from_slice(&data[at..at + 6]);
        *row = DomainEntry {
            id,
            id_length: data[at + 6],
            subnet: data[at + 7],
            node: data[at + 8] & 0x7F,
            invalid: data[at + 9] != 0,
        };
        at += DOMAIN_ENTRY_LEN;
    }
    for slot in cfg.groups.iter_mut() {
        *slot = if data[at] != 0 {
            Some(GroupEntry {
                domain_index: data[at + 1],
                group: data[at + 2],
                member: data[at + 3],
            })
        } else {
            None
        };
        at += GROUP_ENTRY_LEN;
    }
    Ok(cfg)
}

/// Network-image segment codec over the stack's shared configuration.
pub struct NetworkImageCodec {
    config: Rc<RefCell<ConfigData>>,
}

impl NetworkImageCodec {
    pub fn new(config: Rc<RefCell<ConfigData>>) -> Self {
        Self { config }
    }
}

impl SegmentCodec for NetworkImageCodec {
    fn serialize(&self, out: &mut Vec<u8>) {
        encode_config(&self.config.borrow(), out);
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<(), PersistenceError> {
        *self.config.borrow_mut() = decode_config(data)?;
        Ok(())
    }
}

/// Application-data segment codec: delegates to registered handlers.
pub struct AppDataCodec {
    serialize: Box<dyn Fn(&mut Vec<u8>)>,
    deserialize: Box<dyn FnMut(&[u8]) -> Result<(), PersistenceError>>,
}

impl AppDataCodec {
    pub fn new(
        serialize: Box<dyn Fn(&mut Vec<u8>)>,
        deserialize: Box<dyn FnMut(&[u8]) -> Result<(), PersistenceError>>,
    ) -> Self {
        Self { serialize, deserialize }
    }
}

impl SegmentCodec for AppDataCodec {
    fn serialize(&self, out: &mut Vec<u8>) {
        (self.serialize)(out);
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<(), PersistenceError> {
        (self.deserialize)(data)
    }
}
