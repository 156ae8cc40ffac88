//! Operator commands
//!
//! Lines arrive over the control channel. Parsing only produces a typed
//! [`Command`]; the tool owning the tables executes it.

use crate::dataplane::{mask, prefix_to_netmask, Outbound};
use std::fmt;
use std::net::Ipv4Addr;

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line
    Empty,
    /// `arp`
    ArpList,
    /// `arp <ip> <ifname>`
    ArpResolve { ip: Ipv4Addr, interface: String },
    /// `route` or `route list`
    RouteList,
    /// `route add <net>/<prefix> via <gw> dev <ifname>`
    RouteAdd(RouteSpec),
    /// `route del <net>/<prefix> via <gw> dev <ifname>`
    RouteDel(RouteSpec),
}

/// Route arguments shared by `route add` and `route del`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    /// Already masked with `netmask`.
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub interface: String,
}

/// Operator-facing command errors
///
/// A missing token renders as empty text between the quotes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("`{0}' is not a valid IPv4 address")]
    InvalidAddress(String),

    #[error("No network interface provided")]
    MissingInterface,

    #[error("Interface `{0}' unknown")]
    UnknownInterface(String),

    #[error("Expected network specification, not `{0}'")]
    ExpectedNetwork(String),

    #[error("Expected `via', not `{0}'")]
    ExpectedVia(String),

    #[error("Expected next hop, not `{0}'")]
    ExpectedNextHop(String),

    #[error("Expected `dev', not `{0}'")]
    ExpectedDev(String),

    #[error("Subcommand `{0}' not understood")]
    UnknownSubcommand(String),

    #[error("Unsupported command `{0}'")]
    Unsupported(String),
}

/// What a command produced: frames to send and text for the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub frames: Vec<Outbound>,
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

impl From<CommandError> for CommandOutput {
    fn from(err: CommandError) -> Self {
        CommandOutput::new().line(err.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Empty => Ok(()),
            Command::ArpList => write!(f, "arp"),
            Command::ArpResolve { ip, interface } => write!(f, "arp {} {}", ip, interface),
            Command::RouteList => write!(f, "route list"),
            Command::RouteAdd(r) => write!(
                f,
                "route add {}/{} via {} dev {}",
                r.network, r.netmask, r.gateway, r.interface
            ),
            Command::RouteDel(r) => write!(
                f,
                "route del {}/{} via {} dev {}",
                r.network, r.netmask, r.gateway, r.interface
            ),
        }
    }
}

/// Parse one command line. Keywords are case-insensitive.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut tokens = line.split_ascii_whitespace();

    let Some(verb) = tokens.next() else {
        return Ok(Command::Empty);
    };

    if verb.eq_ignore_ascii_case("arp") {
        parse_arp(&mut tokens)
    } else if verb.eq_ignore_ascii_case("route") {
        parse_route(&mut tokens)
    } else {
        Err(CommandError::Unsupported(verb.to_string()))
    }
}

fn parse_arp<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Command, CommandError> {
    let Some(ip) = tokens.next() else {
        return Ok(Command::ArpList);
    };
    let ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| CommandError::InvalidAddress(ip.to_string()))?;
    let interface = tokens.next().ok_or(CommandError::MissingInterface)?;

    Ok(Command::ArpResolve {
        ip,
        interface: interface.to_string(),
    })
}

fn parse_route<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Command, CommandError> {
    let subcommand = tokens.next().unwrap_or("list");

    if subcommand.eq_ignore_ascii_case("list") {
        Ok(Command::RouteList)
    } else if subcommand.eq_ignore_ascii_case("add") {
        Ok(Command::RouteAdd(parse_route_spec(tokens)?))
    } else if subcommand.eq_ignore_ascii_case("del") {
        Ok(Command::RouteDel(parse_route_spec(tokens)?))
    } else {
        Err(CommandError::UnknownSubcommand(subcommand.to_string()))
    }
}

fn parse_route_spec<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<RouteSpec, CommandError> {
    let tok = tokens.next().unwrap_or("");
    let (network, netmask) =
        parse_network(tok).ok_or_else(|| CommandError::ExpectedNetwork(tok.to_string()))?;

    let tok = tokens.next().unwrap_or("");
    if !tok.eq_ignore_ascii_case("via") {
        return Err(CommandError::ExpectedVia(tok.to_string()));
    }

    let tok = tokens.next().unwrap_or("");
    let gateway: Ipv4Addr = tok
        .parse()
        .map_err(|_| CommandError::ExpectedNextHop(tok.to_string()))?;

    let tok = tokens.next().unwrap_or("");
    if !tok.eq_ignore_ascii_case("dev") {
        return Err(CommandError::ExpectedDev(tok.to_string()));
    }

    let interface = tokens
        .next()
        .ok_or_else(|| CommandError::UnknownInterface(String::new()))?;

    Ok(RouteSpec {
        network: mask(network, netmask),
        netmask,
        gateway,
        interface: interface.to_string(),
    })
}

/// `a.b.c.d/prefix`
fn parse_network(text: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let (ip, prefix) = text.split_once('/')?;
    let ip: Ipv4Addr = ip.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((ip, prefix_to_netmask(prefix)))
}
