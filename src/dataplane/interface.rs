//! Router-side view of a configured interface.

use crate::config::InterfaceSpec;
use crate::protocol::{ethernet, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Wire number of an interface (1-based, as used by the transport).
pub type IfNum = u16;

/// An addressed interface owned by the router for the process lifetime.
///
/// Only `mac` changes after creation, when the transport handshake arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub num: IfNum,
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// L3 MTU, Ethernet header excluded.
    pub mtu: u16,
}

impl Interface {
    /// Builds interface `num` from a parsed specification.
    ///
    /// Fails if the specification carries no IPv4 address.
    pub fn from_spec(num: IfNum, spec: &InterfaceSpec) -> Result<Self> {
        let addr = spec.ipv4.ok_or_else(|| {
            Error::Config(format!("interface {} has no IPv4 address", spec.name))
        })?;

        Ok(Self {
            num,
            name: spec.name.clone(),
            mac: MacAddr::ZERO,
            ip: addr.ip,
            netmask: addr.netmask(),
            mtu: spec.mtu,
        })
    }

    /// Network address of the attached subnet.
    pub fn network(&self) -> Ipv4Addr {
        mask(self.ip, self.netmask)
    }

    /// Largest Ethernet frame this interface may transmit.
    pub fn max_frame_len(&self) -> usize {
        self.mtu as usize + ethernet::HEADER_LEN
    }
}

/// A bridge port: an interface without L3 configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub num: IfNum,
    pub name: String,
    pub mac: MacAddr,
}

impl Port {
    /// Ports numbered 1..=N from parsed specifications.
    pub fn from_specs(specs: &[InterfaceSpec]) -> Vec<Port> {
        specs
            .iter()
            .zip(1..)
            .map(|(spec, num)| Port {
                num,
                name: spec.name.clone(),
                mac: MacAddr::ZERO,
            })
            .collect()
    }
}

/// `addr & netmask`.
pub fn mask(addr: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(netmask))
}

/// Netmask for a prefix length of at most 32.
pub fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    let bits = match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    };
    Ipv4Addr::from(bits)
}

/// Number of leading one bits in `netmask`.
pub fn netmask_to_prefix(netmask: Ipv4Addr) -> u8 {
    u32::from(netmask).leading_ones() as u8
}
