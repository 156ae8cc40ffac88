//! ICMP error replies sent back towards the originator of a datagram.

use super::interface::Interface;
use crate::protocol::ethernet::FrameBuilder;
use crate::protocol::icmp::{build_error_message, IcmpError, ICMP_HEADER_SIZE};
use crate::protocol::ipv4::{Ipv4Builder, Ipv4Header, Protocol, MIN_HEADER_SIZE};
use crate::protocol::{EtherType, MacAddr};

/// Default TTL of router-originated ICMP messages.
pub const DEFAULT_ICMP_TTL: u8 = 64;

/// Settings for originated ICMP errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpSettings {
    pub ttl: u8,
    /// Cap on quoted payload bytes after the original header.
    /// `None` quotes as much as the interface MTU allows.
    pub max_embedded: Option<usize>,
}

impl Default for IcmpSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_ICMP_TTL,
            max_embedded: None,
        }
    }
}

/// Builds the Ethernet frame carrying an ICMP `error` about `original`.
///
/// The reply leaves through `via` (the interface the datagram came in on),
/// addressed to `sender_mac` and the datagram's source IP. The quoted
/// datagram is cut so that the frame fits `via`'s MTU.
pub fn build_icmp_error(
    error: IcmpError,
    via: &Interface,
    sender_mac: MacAddr,
    original: &Ipv4Header<'_>,
    settings: &IcmpSettings,
) -> Vec<u8> {
    let mut max_icmp = (via.mtu as usize).saturating_sub(MIN_HEADER_SIZE);
    if let Some(cap) = settings.max_embedded {
        max_icmp = max_icmp.min(ICMP_HEADER_SIZE + original.header_len() + cap);
    }

    let icmp = build_error_message(
        error,
        original.header_bytes(),
        original.payload(),
        max_icmp,
    );

    let datagram = Ipv4Builder::new()
        .src_addr(via.ip)
        .dst_addr(original.src_addr())
        .ttl(settings.ttl)
        .protocol(Protocol::Icmp as u8)
        .payload(&icmp)
        .build();

    FrameBuilder::with_capacity(datagram.len())
        .dst_mac(sender_mac)
        .src_mac(via.mac)
        .ethertype(EtherType::Ipv4)
        .payload(&datagram)
        .build()
}
