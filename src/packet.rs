//! RCON wire frames and the packet id allocator.
//!
//! Layout on the wire, all fields little-endian:
//!
//! ```text
//! [i32 size][i32 id][i32 type][body bytes...][0x00][0x00]
//! ```
//!
//! `size` counts everything after the size field itself, so an empty body
//! gives the minimum of 10 bytes.

use byteorder::{ByteOrder, LE};

use crate::error::{Error, Result};

/// Smallest legal value of the `size` field (empty body).
pub const PSIZE_MIN: i32 = 10;
/// Largest value of the `size` field this client will accept.
pub const PSIZE_MAX: i32 = 4096;

/// Packet type values fixed by the protocol.
///
/// `AUTH_RESPONSE` and `EXEC_COMMAND` share the value 2; which one a frame
/// means depends on who sent it.
pub mod ptype {
    pub const AUTH: i32 = 3;
    pub const AUTH_RESPONSE: i32 = 2;
    pub const EXEC_COMMAND: i32 = 2;
    pub const RESPONSE_VALUE: i32 = 0;
}

/// One RCON frame. The body is opaque bytes; it is printed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub ptype: i32,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(id: i32, ptype: i32, body: impl Into<Vec<u8>>) -> Packet {
        Packet {
            id,
            ptype,
            body: body.into(),
        }
    }

    /// Serializes the packet, size prefix included.
    pub fn encode(&self) -> Vec<u8> {
        let size = PSIZE_MIN + self.body.len() as i32;
        let mut buf = Vec::with_capacity(4 + size as usize);
        let mut head = [0u8; 12];
        LE::write_i32(&mut head[0..4], size);
        LE::write_i32(&mut head[4..8], self.id);
        LE::write_i32(&mut head[8..12], self.ptype);
        buf.extend_from_slice(&head);
        buf.extend_from_slice(&self.body);
        buf.extend_from_slice(&[0x00, 0x00]);
        buf
    }

    /// Parses a complete frame, size prefix included.
    ///
    /// The size field must be within `[PSIZE_MIN, PSIZE_MAX]` and match the
    /// actual frame length, the body must be free of NUL bytes, and the frame
    /// must end with the NUL pair.
    pub fn decode(frame: &[u8]) -> Result<Packet> {
        if frame.len() < 4 {
            return Err(Error::MalformedFrame(format!(
                "frame truncated before size field ({} bytes)",
                frame.len()
            )));
        }
        let size = LE::read_i32(&frame[0..4]);
        if !(PSIZE_MIN..=PSIZE_MAX).contains(&size) {
            return Err(Error::MalformedFrame(format!(
                "size {size} outside [{PSIZE_MIN}, {PSIZE_MAX}]"
            )));
        }
        if frame.len() != 4 + size as usize {
            return Err(Error::MalformedFrame(format!(
                "size field says {size} but frame carries {} bytes",
                frame.len() - 4
            )));
        }
        if frame[frame.len() - 2..] != [0x00, 0x00] {
            return Err(Error::MalformedFrame(
                "frame does not end with the NUL pair".into(),
            ));
        }
        let body = &frame[12..frame.len() - 2];
        if body.contains(&0x00) {
            return Err(Error::MalformedFrame("stray NUL inside body".into()));
        }
        Ok(Packet {
            id: LE::read_i32(&frame[4..8]),
            ptype: LE::read_i32(&frame[8..12]),
            body: body.to_vec(),
        })
    }
}

/// Hands out packet ids 1, 2, 3, … — never 0, never -1 (the auth-failure
/// sentinel). Each command round-trip consumes two ids.
#[derive(Debug)]
pub struct IdAllocator {
    next: i32,
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator { next: 1 }
    }

    pub fn next(&mut self) -> Result<i32> {
        if self.next == i32::MAX {
            return Err(Error::ProtocolViolation("packet id space exhausted"));
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
