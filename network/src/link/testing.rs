//! Scripted link double for host-side tests.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use super::crc::append_crc;
use super::lpdu::LpduHeader;
use super::sicb::{NICB_INCOMING_L2M2, NICB_LOCAL_NM, NICB_RESPONSE};
use super::traits::{LinkCaps, LinkError, LonLink};
use super::xcvr::{response_success, LNM_DATA_OFFSET, LNM_HEADER_LEN, LNM_TAG, NM_READ_MEMORY};

#[derive(Default)]
struct Inner {
    open: bool,
    rx: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    unique_id: Option<[u8; 6]>,
    fail_writes: usize,
}

/// A [`LonLink`] that replays scripted inbound bytes and records every
/// written frame.
///
/// The handle is cheap to clone; keep one side in the test while the
/// other goes into the link layer as `Box<dyn LonLink>`. With
/// [`ScriptedLink::answer_unique_id`] set it also plays the transceiver's
/// management responder: a memory-read request is answered with the
/// configured id on the next `read`.
#[derive(Clone)]
pub struct ScriptedLink {
    caps: LinkCaps,
    inner: Rc<RefCell<Inner>>,
}

impl ScriptedLink {
    pub fn new(caps: LinkCaps) -> Self {
        Self {
            caps,
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    /// Auto-answer unique-id memory reads with `id`.
    pub fn answer_unique_id(self, id: [u8; 6]) -> Self {
        self.inner.borrow_mut().unique_id = Some(id);
        self
    }

    /// Queue inbound bytes for a later `read`.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.inner.borrow_mut().rx.push_back(bytes.to_vec());
    }

    /// Drain the recorded outbound frames, oldest first.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.inner.borrow_mut().written)
    }

    /// Fail the next `n` writes, then recover.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.borrow_mut().fail_writes = n;
    }
}

impl LonLink for ScriptedLink {
    fn open(&mut self) -> Result<(), LinkError> {
        self.inner.borrow_mut().open = true;
        Ok(())
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize, LinkError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.open {
            return Err(LinkError::NotOpen);
        }
        match inner.rx.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(dst.len());
                dst[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk[n..].to_vec();
                    inner.rx.push_front(rest);
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.open {
            return Err(LinkError::NotOpen);
        }
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(LinkError::TxFailed);
        }
        if let Some(id) = inner.unique_id {
            if frame.first() == Some(&NICB_LOCAL_NM) && frame.get(3) == Some(&NM_READ_MEMORY) {
                let resp = management_response(response_success(NM_READ_MEMORY), &id);
                inner.rx.push_back(resp);
            }
        }
        inner.written.push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.inner.borrow_mut().open = false;
    }

    fn caps(&self) -> LinkCaps {
        self.caps
    }
}

/// Build the response frame the interface sends for a local-NM request.
pub fn management_response(code: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = alloc::vec![NICB_RESPONSE, (LNM_HEADER_LEN - 2 + data.len()) as u8];
    frame.push(0x20 | LNM_TAG);
    frame.push(code);
    frame.resize(LNM_DATA_OFFSET, 0);
    frame.extend_from_slice(data);
    frame
}

/// Build an incoming L2 mode 2 frame around `npdu`, the way a transceiver
/// delivers it: marker, LPDU (header + NPDU + CRC), then the status
/// register and zero-crossing bytes.
pub fn build_incoming_l2m2(
    npdu: &[u8],
    priority: bool,
    alt_path: bool,
    reg: u8,
    zero_crossing: u8,
) -> Vec<u8> {
    let mut lpdu = alloc::vec![0u8; npdu.len() + 3];
    lpdu[0] = LpduHeader::new(priority, alt_path, 0).to_byte();
    lpdu[1..1 + npdu.len()].copy_from_slice(npdu);
    let lpdu_len = lpdu.len();
    append_crc(&mut lpdu, lpdu_len - 2).expect("lpdu crc space");

    let mut frame = alloc::vec![NICB_INCOMING_L2M2, (lpdu.len() + 3) as u8, NICB_LOCAL_NM];
    frame.extend_from_slice(&lpdu);
    frame.push(reg);
    frame.push(zero_crossing);
    frame
}
