//! Command-line interface specifications
//!
//! Format: `NAME[IPV4:a.b.c.d/prefix]`, optionally followed by `=MTU`.

use crate::dataplane::prefix_to_netmask;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Default L3 MTU.
pub const DEFAULT_MTU: u16 = 1500;
/// Smallest accepted MTU.
pub const MIN_MTU: u16 = 400;

/// An IPv4 address with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub ip: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    pub fn netmask(&self) -> Ipv4Addr {
        prefix_to_netmask(self.prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

/// Errors in an interface specification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceSpecError {
    #[error("Error in interface specification `{0}': lacks '['")]
    MissingOpenBracket(String),

    #[error("Error in interface specification `{0}': lacks ']'")]
    MissingCloseBracket(String),

    #[error("Interface specification `{0}' does not start with `IPV4:'")]
    MissingIpv4Prefix(String),

    #[error("Error in interface specification `{0}': lacks '/'")]
    MissingSlash(String),

    #[error("IP address `{0}' malformed")]
    MalformedAddress(String),

    #[error("Netmask `{0}' malformed")]
    MalformedNetmask(String),

    #[error("Netmask invalid (too large)")]
    NetmaskTooLarge,

    #[error("Error in interface specification: MTU not a number")]
    MtuNotANumber,

    #[error("Error in interface specification: MTU too small")]
    MtuTooSmall,

    #[error("Error in interface specification: MTU too large")]
    MtuTooLarge,

    #[error("Error in interface specification: empty interface name")]
    EmptyName,
}

/// A parsed interface argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    /// Absent for bridging tools that take bare names.
    pub ipv4: Option<Ipv4Cidr>,
    /// L3 MTU, Ethernet header excluded.
    pub mtu: u16,
}

impl InterfaceSpec {
    /// A bare interface name without address, as taken by `switch` and `hub`.
    pub fn bare(name: &str) -> Result<Self, InterfaceSpecError> {
        if name.is_empty() {
            return Err(InterfaceSpecError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            ipv4: None,
            mtu: DEFAULT_MTU,
        })
    }
}

impl FromStr for InterfaceSpec {
    type Err = InterfaceSpecError;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let open = arg
            .find('[')
            .ok_or_else(|| InterfaceSpecError::MissingOpenBracket(arg.to_string()))?;
        let name = &arg[..open];
        if name.is_empty() {
            return Err(InterfaceSpecError::EmptyName);
        }

        let rest = &arg[open + 1..];
        let close = rest
            .find(']')
            .ok_or_else(|| InterfaceSpecError::MissingCloseBracket(arg.to_string()))?;
        let ipv4 = parse_network(&rest[..close])?;

        let mtu = match rest[close + 1..].strip_prefix('=') {
            Some(mtu) => parse_mtu(mtu)?,
            None => DEFAULT_MTU,
        };

        Ok(Self {
            name: name.to_string(),
            ipv4: Some(ipv4),
            mtu,
        })
    }
}

/// Parses `IPV4:a.b.c.d/prefix`. The `IPV4:` tag is case-insensitive.
fn parse_network(spec: &str) -> Result<Ipv4Cidr, InterfaceSpecError> {
    const TAG: &str = "IPV4:";

    let net = match spec.get(..TAG.len()) {
        Some(tag) if tag.eq_ignore_ascii_case(TAG) => &spec[TAG.len()..],
        _ => return Err(InterfaceSpecError::MissingIpv4Prefix(spec.to_string())),
    };

    let (ip, prefix) = net
        .split_once('/')
        .ok_or_else(|| InterfaceSpecError::MissingSlash(net.to_string()))?;

    let ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| InterfaceSpecError::MalformedAddress(ip.to_string()))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| InterfaceSpecError::MalformedNetmask(prefix.to_string()))?;
    if prefix > 32 {
        return Err(InterfaceSpecError::NetmaskTooLarge);
    }

    Ok(Ipv4Cidr {
        ip,
        prefix: prefix as u8,
    })
}

fn parse_mtu(text: &str) -> Result<u16, InterfaceSpecError> {
    let mtu: u64 = text
        .parse()
        .map_err(|_| InterfaceSpecError::MtuNotANumber)?;
    if mtu < MIN_MTU as u64 {
        return Err(InterfaceSpecError::MtuTooSmall);
    }
    u16::try_from(mtu).map_err(|_| InterfaceSpecError::MtuTooLarge)
}
