//! Common protocol types

use std::fmt;
use std::str::FromStr;

/// Length of a hardware address in bytes.
pub const MAC_ADDR_LEN: usize = 6;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_ADDR_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    /// Sentinel for "not resolved yet".
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    /// Reads a MAC address from the first six bytes of `bytes`.
    ///
    /// Returns `None` if fewer than six bytes are available.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; MAC_ADDR_LEN] = bytes.get(..MAC_ADDR_LEN)?.try_into().ok()?;
        Some(MacAddr(octets))
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// True for group addresses (I/G bit set), which includes broadcast.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError {
    kind: ParseMacAddrErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseMacAddrErrorKind {
    Length,
    Hex,
}

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseMacAddrErrorKind::Length => write!(f, "invalid MAC address length"),
            ParseMacAddrErrorKind::Hex => write!(f, "invalid hex digit in MAC address"),
        }
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Parses the colon-separated form used in listings: "00:11:22:33:44:55".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != MAC_ADDR_LEN {
            return Err(ParseMacAddrError {
                kind: ParseMacAddrErrorKind::Length,
            });
        }

        let mut result = [0u8; MAC_ADDR_LEN];
        for (slot, part) in result.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseMacAddrError {
                    kind: ParseMacAddrErrorKind::Length,
                });
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseMacAddrError {
                kind: ParseMacAddrErrorKind::Hex,
            })?;
        }

        Ok(MacAddr(result))
    }
}

/// EtherType values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Arp,
    Unknown(u16),
}

impl EtherType {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;

    pub fn from_u16(value: u16) -> Self {
        match value {
            Self::IPV4 => EtherType::Ipv4,
            Self::ARP => EtherType::Arp,
            other => EtherType::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::Ipv4 => Self::IPV4,
            EtherType::Arp => Self::ARP,
            EtherType::Unknown(value) => value,
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.to_u16())
    }
}
