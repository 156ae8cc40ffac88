//! ICMP (Internet Control Message Protocol) - RFC 792
//!
//! Only the error messages a router originates are built here.

use super::ipv4::checksum;
use crate::{Error, Result};
use std::fmt;

/// ICMP header size: type, code, checksum and the 4-byte quench field.
pub const ICMP_HEADER_SIZE: usize = 8;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            _ => None,
        }
    }
}

/// Destination Unreachable codes (RFC 792)
pub mod dest_unreachable {
    /// Network unreachable
    pub const NET_UNREACHABLE: u8 = 0;
    /// Host unreachable
    pub const HOST_UNREACHABLE: u8 = 1;
    /// Fragmentation needed but DF set
    pub const FRAGMENTATION_NEEDED: u8 = 4;
}

/// Time Exceeded codes (RFC 792)
pub mod time_exceeded {
    /// TTL exceeded in transit
    pub const TTL_EXCEEDED: u8 = 0;
}

/// The error conditions the forwarding path reports back to a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    NetUnreachable,
    HostUnreachable,
    /// DF was set; `mtu` is the next-hop MTU (RFC 1191).
    FragmentationNeeded { mtu: u16 },
    TtlExceeded,
}

impl IcmpError {
    pub fn icmp_type(&self) -> IcmpType {
        match self {
            IcmpError::TtlExceeded => IcmpType::TimeExceeded,
            _ => IcmpType::DestinationUnreachable,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            IcmpError::NetUnreachable => dest_unreachable::NET_UNREACHABLE,
            IcmpError::HostUnreachable => dest_unreachable::HOST_UNREACHABLE,
            IcmpError::FragmentationNeeded { .. } => dest_unreachable::FRAGMENTATION_NEEDED,
            IcmpError::TtlExceeded => time_exceeded::TTL_EXCEEDED,
        }
    }

    /// The type-specific second word of the header.
    fn quench(&self) -> [u8; 4] {
        match self {
            IcmpError::FragmentationNeeded { mtu } => {
                let mtu = mtu.to_be_bytes();
                [0, 0, mtu[0], mtu[1]]
            }
            _ => [0; 4],
        }
    }
}

impl fmt::Display for IcmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcmpError::NetUnreachable => write!(f, "network unreachable"),
            IcmpError::HostUnreachable => write!(f, "host unreachable"),
            IcmpError::FragmentationNeeded { mtu } => {
                write!(f, "fragmentation needed (mtu {})", mtu)
            }
            IcmpError::TtlExceeded => write!(f, "time exceeded"),
        }
    }
}

/// Parsed ICMP message
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse(format!(
                "ICMP packet too short: {} bytes",
                buffer.len()
            )));
        }

        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Next-hop MTU carried by a fragmentation-needed message.
    pub fn next_hop_mtu(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    /// Get the typed ICMP message type
    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    /// For error messages: the embedded offending datagram.
    pub fn original_datagram(&self) -> &'a [u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }

    pub fn validate_checksum(&self) -> bool {
        checksum(self.buffer) == 0
    }
}

/// Builds an ICMP error message that quotes the offending datagram.
///
/// The original header and payload are embedded whole. Payload bytes are
/// cut only when the message would exceed `max_len`. The header is always
/// kept.
pub fn build_error_message(
    error: IcmpError,
    original_header: &[u8],
    original_payload: &[u8],
    max_len: usize,
) -> Vec<u8> {
    let room = max_len.saturating_sub(ICMP_HEADER_SIZE + original_header.len());
    let payload_len = original_payload.len().min(room);

    let mut packet =
        Vec::with_capacity(ICMP_HEADER_SIZE + original_header.len() + payload_len);
    packet.push(error.icmp_type() as u8);
    packet.push(error.code());
    packet.extend_from_slice(&[0, 0]);
    packet.extend_from_slice(&error.quench());
    packet.extend_from_slice(original_header);
    packet.extend_from_slice(&original_payload[..payload_len]);

    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());

    packet
}
