//! Ethernet frame parsing and construction

use super::{EtherType, MacAddr};
use crate::{Error, Result};

/// Ethernet II header length: dst(6) + src(6) + type(2).
pub const HEADER_LEN: usize = 14;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    dst: MacAddr,
    src: MacAddr,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Parse(format!(
                "frame too short: {} bytes",
                buffer.len()
            )));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&buffer[0..6]);
        src.copy_from_slice(&buffer[6..12]);

        Ok(Self {
            buffer,
            dst: MacAddr(dst),
            src: MacAddr(src),
        })
    }

    pub fn dst_mac(&self) -> MacAddr {
        self.dst
    }

    pub fn src_mac(&self) -> MacAddr {
        self.src
    }

    pub fn ethertype(&self) -> EtherType {
        EtherType::from_u16(u16::from_be_bytes([self.buffer[12], self.buffer[13]]))
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::with_capacity(HEADER_LEN)
    }

    /// Pre-sizes the buffer for a payload of `payload_len` bytes.
    pub fn with_capacity(payload_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(HEADER_LEN + payload_len),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn ethertype(mut self, ethertype: EtherType) -> Self {
        self.buffer
            .extend_from_slice(&ethertype.to_u16().to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
