//! Routing table
//!
//! An ordered list of routes. Routes to the same network stay contiguous,
//! ordered by netmask from shortest to longest prefix. Lookups match the
//! stored network exactly and return the first hit in table order.

use super::interface::{mask, netmask_to_prefix, IfNum, Interface};
use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

/// Source of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Directly connected network, derived from an interface. Never removable.
    Connected,
    /// Entered by the operator.
    Static,
}

/// Route entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Next hop; `0.0.0.0` means the destination is on-link.
    pub gateway: Ipv4Addr,
    /// Egress interface
    pub interface: IfNum,
    pub source: RouteSource,
}

impl Route {
    /// Operator route. The network is masked with `netmask`.
    pub fn new_static(
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: IfNum,
    ) -> Self {
        Self {
            network: mask(network, netmask),
            netmask,
            gateway,
            interface,
            source: RouteSource::Static,
        }
    }

    /// On-link route for an interface's own subnet.
    pub fn connected(iface: &Interface) -> Self {
        Self {
            network: iface.network(),
            netmask: iface.netmask,
            gateway: Ipv4Addr::UNSPECIFIED,
            interface: iface.num,
            source: RouteSource::Connected,
        }
    }

    pub fn is_on_link(&self) -> bool {
        self.gateway.is_unspecified()
    }

    pub fn is_deletable(&self) -> bool {
        self.source == RouteSource::Static
    }

    pub fn prefix_len(&self) -> u8 {
        netmask_to_prefix(self.netmask)
    }

    /// The address to resolve with ARP when sending to `dst` over this route.
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.is_on_link() {
            dst
        } else {
            self.gateway
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -> {}", self.network, self.netmask, self.gateway)
    }
}

/// Netmasks compare as host-order integers, so a longer prefix is larger.
fn compare_masks(a: Ipv4Addr, b: Ipv4Addr) -> Ordering {
    u32::from(a).cmp(&u32::from(b))
}

/// Ordered routing table
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Inserts a route at its ordered position.
    ///
    /// Within the block of routes to the same network, the new route goes
    /// after every route whose mask is not longer than its own. A route to a
    /// network not yet present is appended.
    pub fn insert(&mut self, route: Route) {
        let mut position = None;
        for (i, existing) in self.routes.iter().enumerate() {
            if existing.network != route.network {
                if position.is_some() {
                    // Walked past the end of the block.
                    break;
                }
                continue;
            }
            if compare_masks(route.netmask, existing.netmask) == Ordering::Less {
                position = Some(i);
                break;
            }
            position = Some(i + 1);
        }

        match position {
            Some(i) => self.routes.insert(i, route),
            None => self.routes.push(route),
        }
    }

    /// First route whose stored network equals `network`.
    pub fn lookup(&self, network: Ipv4Addr) -> Option<&Route> {
        self.routes.iter().find(|r| r.network == network)
    }

    /// The first route to `0.0.0.0`.
    pub fn lookup_default(&self) -> Option<&Route> {
        self.lookup(Ipv4Addr::UNSPECIFIED)
    }

    /// Removes the first deletable route matching network, mask and gateway.
    ///
    /// Returns the removed route; connected routes are never removed.
    pub fn delete(
        &mut self,
        network: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Option<Route> {
        let network = mask(network, netmask);
        let index = self.routes.iter().position(|r| {
            r.network == network
                && r.netmask == netmask
                && r.gateway == gateway
                && r.is_deletable()
        })?;
        Some(self.routes.remove(index))
    }

    /// Installs one connected route per interface, shortest mask first.
    pub fn install_connected(&mut self, interfaces: &[Interface]) {
        let mut connected: Vec<Route> = interfaces.iter().map(Route::connected).collect();
        // Stable: equal masks keep interface order.
        connected.sort_by(|a, b| compare_masks(a.netmask, b.netmask));
        for route in connected {
            self.insert(route);
        }
    }

    /// All routes in table order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
