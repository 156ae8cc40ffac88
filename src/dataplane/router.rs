//! Packet processing router
//!
//! Owns the interfaces, the ARP cache and the routing table, and runs each
//! inbound frame through ARP handling or the IPv4 forwarder.

use super::arp_cache::ArpCache;
use super::arp_processor::{process_arp, ArpAction};
use super::forwarder::{ForwardAction, ForwardContext, Forwarder};
use super::icmp_error::IcmpSettings;
use super::interface::{IfNum, Interface};
use super::routing::{Route, RoutingTable};
use super::Outbound;
use crate::command::{Command, CommandError, CommandOutput, RouteSpec};
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::Frame;
use crate::protocol::types::EtherType;
use crate::protocol::MacAddr;
use crate::telemetry::MetricsRegistry;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// What the router does with IPv4 traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    /// Full IPv4 forwarding plus ARP.
    Router,
    /// ARP only: IPv4 datagrams are ignored and `route` is unsupported.
    ArpResolver,
}

/// Tunables taken from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterSettings {
    pub arp_cache_size: usize,
    pub icmp: IcmpSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            arp_cache_size: super::arp_cache::DEFAULT_CAPACITY,
            icmp: IcmpSettings::default(),
        }
    }
}

/// The router
pub struct Router {
    mode: RouterMode,
    interfaces: Vec<Interface>,
    arp_cache: ArpCache,
    routes: RoutingTable,
    /// Connected routes are installed when the first frame arrives.
    routes_initialized: bool,
    forwarder: Forwarder,
    metrics: Arc<MetricsRegistry>,
}

impl Router {
    /// Create a router over `interfaces`, numbered 1..=N in order.
    pub fn new(
        mode: RouterMode,
        interfaces: Vec<Interface>,
        settings: RouterSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        for iface in &interfaces {
            metrics.register_interface(&iface.name);
        }
        Self {
            mode,
            interfaces,
            arp_cache: ArpCache::new(settings.arp_cache_size),
            routes: RoutingTable::new(),
            routes_initialized: false,
            forwarder: Forwarder::new(settings.icmp),
            metrics,
        }
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Applies the transport handshake: one MAC per interface, in order.
    pub fn set_macs(&mut self, macs: &[MacAddr]) {
        for (iface, mac) in self.interfaces.iter_mut().zip(macs) {
            iface.mac = *mac;
            info!(interface = %iface.name, mac = %mac, ip = %iface.ip, "Interface up");
        }
    }

    fn interface(&self, num: IfNum) -> Option<&Interface> {
        num.checked_sub(1)
            .and_then(|i| self.interfaces.get(i as usize))
    }

    /// Case-insensitive lookup by name.
    fn interface_by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    fn ensure_connected_routes(&mut self) {
        if self.routes_initialized || self.mode == RouterMode::ArpResolver {
            return;
        }
        self.routes.install_connected(&self.interfaces);
        self.routes_initialized = true;
        self.metrics.set_route_count(self.routes.len());
        debug!(routes = self.routes.len(), "Installed connected routes");
    }

    // ========================================
    // Frame processing
    // ========================================

    /// Process one frame received on interface `ifnum`.
    ///
    /// Returns the frames to transmit, each tagged with its egress interface.
    pub fn process_frame(&mut self, ifnum: IfNum, data: &[u8]) -> Vec<Outbound> {
        let Some(ingress) = self.interface(ifnum).cloned() else {
            error!(
                interface = ifnum,
                count = self.interfaces.len(),
                "Frame tagged with an interface that does not exist"
            );
            return Vec::new();
        };

        self.ensure_connected_routes();
        self.metrics.record_rx(&ingress.name, data.len());

        let frame = match Frame::parse(data) {
            Ok(f) => f,
            Err(e) => {
                debug!(interface = %ingress.name, error = %e, "Malformed frame");
                self.metrics.record_rx_drop(&ingress.name);
                return Vec::new();
            }
        };

        let out = match frame.ethertype() {
            EtherType::Arp => self.handle_arp(&ingress, &frame),
            EtherType::Ipv4 if self.mode == RouterMode::Router => self.handle_ipv4(&ingress, &frame),
            other => {
                trace!(interface = %ingress.name, ethertype = %other, "Ignoring frame");
                self.metrics.record_rx_drop(&ingress.name);
                Vec::new()
            }
        };

        self.transmit(out)
    }

    fn handle_arp(&mut self, ingress: &Interface, frame: &Frame<'_>) -> Vec<Outbound> {
        let packet = match ArpPacket::parse(frame.payload()) {
            Ok(p) => p,
            Err(e) => {
                debug!(interface = %ingress.name, error = %e, "Unsupported ARP frame");
                self.metrics.record_rx_drop(&ingress.name);
                return Vec::new();
            }
        };

        let action = process_arp(&packet, ingress, &self.interfaces, &mut self.arp_cache);
        self.metrics.set_arp_cache_size(self.arp_cache.len());

        match action {
            ArpAction::Reply(reply) => {
                self.metrics.arp_replies_sent.inc();
                vec![(ingress.num, reply.to_frame(packet.sender_mac))]
            }
            ArpAction::Learned(_) => Vec::new(),
            ArpAction::None | ArpAction::NotForUs => {
                self.metrics.record_rx_drop(&ingress.name);
                Vec::new()
            }
        }
    }

    fn handle_ipv4(&mut self, ingress: &Interface, frame: &Frame<'_>) -> Vec<Outbound> {
        let ctx = ForwardContext {
            interfaces: &self.interfaces,
            routes: &self.routes,
            arp_cache: &self.arp_cache,
        };
        let outcome = self.forwarder.forward(&ctx, ingress, frame);

        if outcome.arp_request.is_some() {
            self.metrics.arp_requests_sent.inc();
        }
        match &outcome.action {
            ForwardAction::Forward { frames, .. } => {
                self.metrics.packets_forwarded.inc();
                if frames.len() > 1 {
                    self.metrics.fragments_sent.add(frames.len() as u64);
                }
            }
            ForwardAction::Icmp { .. } => self.metrics.icmp_errors_sent.inc(),
            ForwardAction::Dropped(reason) => {
                debug!(interface = %ingress.name, reason = %reason, "Datagram dropped");
                self.metrics.packets_dropped.inc();
                self.metrics.record_rx_drop(&ingress.name);
            }
        }

        outcome.into_frames()
    }

    /// Final size check and tx accounting for outbound frames.
    fn transmit(&self, frames: Vec<Outbound>) -> Vec<Outbound> {
        frames
            .into_iter()
            .filter(|(num, frame)| match self.interface(*num) {
                Some(iface) if frame.len() <= iface.max_frame_len() => {
                    self.metrics.record_tx(&iface.name, frame.len());
                    true
                }
                Some(iface) => {
                    error!(
                        interface = %iface.name,
                        len = frame.len(),
                        max = iface.max_frame_len(),
                        "Outbound frame exceeds interface MTU"
                    );
                    false
                }
                None => {
                    error!(interface = *num, "Outbound frame for unknown interface");
                    false
                }
            })
            .collect()
    }

    // ========================================
    // Operator commands
    // ========================================

    /// Execute an operator command against the router state.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutput, CommandError> {
        match command {
            Command::Empty => Ok(CommandOutput::new()),
            Command::ArpList => Ok(self.list_arp()),
            Command::ArpResolve { ip, interface } => self.resolve(ip, &interface),
            Command::RouteList | Command::RouteAdd(_) | Command::RouteDel(_)
                if self.mode == RouterMode::ArpResolver =>
            {
                Err(CommandError::Unsupported("route".into()))
            }
            Command::RouteList => Ok(self.list_routes()),
            Command::RouteAdd(spec) => self.add_route(spec),
            Command::RouteDel(spec) => self.del_route(spec),
        }
    }

    fn interface_name(&self, num: IfNum) -> &str {
        self.interface(num).map(|i| i.name.as_str()).unwrap_or("?")
    }

    fn list_arp(&self) -> CommandOutput {
        let lines = self
            .arp_cache
            .entries()
            .map(|e| {
                format!(
                    "{} -> {} ({})",
                    e.ip,
                    e.mac,
                    self.interface_name(e.interface)
                )
            })
            .collect();
        CommandOutput {
            frames: Vec::new(),
            lines,
        }
    }

    /// Prints the cached MAC, or broadcasts a request on `ifname`.
    fn resolve(&mut self, ip: Ipv4Addr, ifname: &str) -> Result<CommandOutput, CommandError> {
        let iface = self
            .interface_by_name(ifname)
            .ok_or_else(|| CommandError::UnknownInterface(ifname.to_string()))?;

        let mac = self.arp_cache.lookup(ip);
        if !mac.is_zero() {
            return Ok(CommandOutput::new().line(mac.to_string()));
        }

        debug!(interface = %iface.name, target = %ip, "Sending ARP request");
        let request = ArpPacket::request(iface.mac, iface.ip, ip);
        let frames = vec![(iface.num, request.to_frame(MacAddr::BROADCAST))];
        self.metrics.arp_requests_sent.inc();

        Ok(CommandOutput {
            frames: self.transmit(frames),
            lines: Vec::new(),
        })
    }

    fn list_routes(&self) -> CommandOutput {
        let lines = self
            .routes
            .routes()
            .iter()
            .map(|r| format!("{} ({})", r, self.interface_name(r.interface)))
            .collect();
        CommandOutput {
            frames: Vec::new(),
            lines,
        }
    }

    fn add_route(&mut self, spec: RouteSpec) -> Result<CommandOutput, CommandError> {
        let ifnum = self
            .interface_by_name(&spec.interface)
            .ok_or_else(|| CommandError::UnknownInterface(spec.interface.clone()))?
            .num;

        if self.arp_cache.lookup(spec.gateway).is_zero() {
            debug!(gateway = %spec.gateway, "Route rejected, gateway MAC unknown");
            return Ok(CommandOutput::new());
        }

        let route = Route::new_static(spec.network, spec.netmask, spec.gateway, ifnum);
        info!(route = %route, interface = %spec.interface, "Route added");
        self.routes.insert(route);
        self.metrics.set_route_count(self.routes.len());
        Ok(CommandOutput::new())
    }

    fn del_route(&mut self, spec: RouteSpec) -> Result<CommandOutput, CommandError> {
        if self.interface_by_name(&spec.interface).is_none() {
            return Err(CommandError::UnknownInterface(spec.interface));
        }

        match self.routes.delete(spec.network, spec.netmask, spec.gateway) {
            Some(route) => {
                info!(route = %route, "Route deleted");
                self.metrics.set_route_count(self.routes.len());
            }
            None => debug!(
                network = %spec.network,
                netmask = %spec.netmask,
                gateway = %spec.gateway,
                "No deletable route matches"
            ),
        }
        Ok(CommandOutput::new())
    }

    /// Logs a command error at warn level and renders it for the operator.
    pub fn command_error(err: CommandError) -> CommandOutput {
        warn!(error = %err, "Command rejected");
        err.into()
    }
}
