//! Envelope codec
//!
//! ```text
//! [u16 BE size, header included][u16 BE type][payload]
//! ```
//!
//! Type 0 is the control channel; type N carries a frame for interface N.

use crate::dataplane::IfNum;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use tracing::warn;

/// Size of the envelope header.
pub const HEADER_LEN: usize = 4;

/// Message type of the control channel.
pub const CONTROL_TYPE: u16 = 0;

/// Largest payload an envelope can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - HEADER_LEN;

/// A decoded envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake or operator command inbound, operator feedback outbound.
    Control(Vec<u8>),
    /// An Ethernet frame from or for `interface`.
    Frame { interface: IfNum, frame: Vec<u8> },
}

impl Message {
    pub fn from_parts(msg_type: u16, payload: Vec<u8>) -> Self {
        if msg_type == CONTROL_TYPE {
            Message::Control(payload)
        } else {
            Message::Frame {
                interface: msg_type,
                frame: payload,
            }
        }
    }

    pub fn msg_type(&self) -> u16 {
        match self {
            Message::Control(_) => CONTROL_TYPE,
            Message::Frame { interface, .. } => *interface,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Control(payload) => payload,
            Message::Frame { frame, .. } => frame,
        }
    }

    /// Serializes the message with its envelope header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.payload();
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::Transport(format!(
                "payload of {} bytes does not fit an envelope",
                payload.len()
            )));
        }

        let size = (payload.len() + HEADER_LEN) as u16;
        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&size.to_be_bytes());
        buf.extend_from_slice(&self.msg_type().to_be_bytes());
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Decodes one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold a whole message,
    /// otherwise the message and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>> {
        let Some(header) = buf.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let (payload_len, msg_type) = decode_header([header[0], header[1], header[2], header[3]])?;
        let total = HEADER_LEN + payload_len;
        let Some(payload) = buf.get(HEADER_LEN..total) else {
            return Ok(None);
        };
        Ok(Some((Message::from_parts(msg_type, payload.to_vec()), total)))
    }
}

/// Parses an envelope header into (payload length, type).
pub fn decode_header(header: [u8; HEADER_LEN]) -> Result<(usize, u16)> {
    let size = u16::from_be_bytes([header[0], header[1]]) as usize;
    let msg_type = u16::from_be_bytes([header[2], header[3]]);
    if size < HEADER_LEN {
        return Err(Error::Transport(format!("invalid envelope size {}", size)));
    }
    Ok((size - HEADER_LEN, msg_type))
}

/// Splits the handshake payload into one MAC per interface.
pub fn parse_handshake(payload: &[u8], interfaces: usize) -> Result<Vec<MacAddr>> {
    let needed = interfaces * crate::protocol::MAC_ADDR_LEN;
    if payload.len() < needed {
        return Err(Error::Transport(format!(
            "handshake carries {} bytes, {} interfaces need {}",
            payload.len(),
            interfaces,
            needed
        )));
    }
    if payload.len() > needed {
        warn!(
            bytes = payload.len(),
            interfaces, "Handshake carries more MACs than configured interfaces"
        );
    }

    Ok(payload[..needed]
        .chunks_exact(crate::protocol::MAC_ADDR_LEN)
        .filter_map(MacAddr::from_slice)
        .collect())
}

/// Operator command text with trailing newline and NUL bytes removed.
pub fn control_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_end_matches(['\n', '\r', '\0'])
        .to_string()
}
