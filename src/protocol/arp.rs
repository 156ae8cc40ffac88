//! ARP (Address Resolution Protocol) - RFC 826

use super::ethernet::FrameBuilder;
use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

const HTYPE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

fn ip_at(buffer: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3])
}

fn mac_at(buffer: &[u8], at: usize) -> MacAddr {
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&buffer[at..at + 6]);
    MacAddr(octets)
}

impl ArpPacket {
    /// Parse an ARP packet from buffer
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse(format!(
                "ARP packet too short: {} bytes",
                buffer.len()
            )));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        if htype != HTYPE_ETHERNET {
            return Err(Error::Parse(format!("unsupported hardware type {}", htype)));
        }

        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if ptype != EtherType::IPV4 {
            return Err(Error::Parse(format!(
                "unsupported protocol type 0x{:04x}",
                ptype
            )));
        }

        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Parse(format!(
                "invalid address lengths {}/{}",
                buffer[4], buffer[5]
            )));
        }

        let operation = u16::from_be_bytes([buffer[6], buffer[7]]);
        let operation = ArpOp::from_u16(operation)
            .ok_or_else(|| Error::Parse(format!("invalid ARP operation {}", operation)))?;

        Ok(Self {
            operation,
            sender_mac: mac_at(buffer, 8),
            sender_ip: ip_at(buffer, 14),
            target_mac: mac_at(buffer, 18),
            target_ip: ip_at(buffer, 24),
        })
    }

    /// Serialize ARP packet to bytes
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];

        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&EtherType::IPV4.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());

        buf
    }

    /// Wraps the packet in an Ethernet frame sourced from `sender_mac`.
    pub fn to_frame(&self, dst: MacAddr) -> Vec<u8> {
        FrameBuilder::with_capacity(ARP_PACKET_SIZE)
            .dst_mac(dst)
            .src_mac(self.sender_mac)
            .ethertype(EtherType::Arp)
            .payload(&self.to_bytes())
            .build()
    }

    /// Create an ARP request. The target hardware address is left zero.
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }
}
