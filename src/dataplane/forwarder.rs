//! IPv4 forwarding pipeline
//!
//! Validates a datagram, resolves the route and the next-hop MAC, decides
//! on fragmentation and produces the frames to transmit. Every failure
//! after validation becomes an ICMP error towards the sender.

use super::arp_cache::ArpCache;
use super::icmp_error::{build_icmp_error, IcmpSettings};
use super::interface::{mask, IfNum, Interface};
use super::routing::RoutingTable;
use crate::protocol::arp::ArpPacket;
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::icmp::IcmpError;
use crate::protocol::ipv4::{Ipv4Header, Ipv4Packet};
use crate::protocol::{EtherType, MacAddr};
use std::fmt;
use tracing::{debug, trace, warn};

/// Why a datagram was discarded without any reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Too short, wrong version or inconsistent lengths.
    Malformed(String),
    BadChecksum,
    /// A route pointed at an interface number that does not exist.
    UnknownInterface(IfNum),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Malformed(why) => write!(f, "malformed: {}", why),
            DropReason::BadChecksum => write!(f, "bad header checksum"),
            DropReason::UnknownInterface(num) => write!(f, "unknown interface {}", num),
        }
    }
}

/// Result of a forwarding decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardAction {
    /// Sent towards the next hop, as one frame or as fragments.
    Forward {
        interface: IfNum,
        next_hop_mac: MacAddr,
        frames: Vec<Vec<u8>>,
    },
    /// Not forwarded; an ICMP error goes back out `interface`.
    Icmp {
        error: IcmpError,
        interface: IfNum,
        frame: Vec<u8>,
    },
    Dropped(DropReason),
}

/// A forwarding decision plus the ARP request issued while making it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutcome {
    /// Broadcast request for an unresolved next hop, on the egress interface.
    pub arp_request: Option<(IfNum, Vec<u8>)>,
    pub action: ForwardAction,
}

impl ForwardOutcome {
    fn new(action: ForwardAction) -> Self {
        Self {
            arp_request: None,
            action,
        }
    }

    /// Frames to transmit, in order.
    pub fn into_frames(self) -> Vec<(IfNum, Vec<u8>)> {
        let mut out: Vec<(IfNum, Vec<u8>)> = self.arp_request.into_iter().collect();
        match self.action {
            ForwardAction::Forward {
                interface, frames, ..
            } => out.extend(frames.into_iter().map(|f| (interface, f))),
            ForwardAction::Icmp {
                interface, frame, ..
            } => out.push((interface, frame)),
            ForwardAction::Dropped(_) => {}
        }
        out
    }
}

/// Router state the pipeline reads.
pub struct ForwardContext<'a> {
    pub interfaces: &'a [Interface],
    pub routes: &'a RoutingTable,
    pub arp_cache: &'a ArpCache,
}

impl ForwardContext<'_> {
    fn interface(&self, num: IfNum) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.num == num)
    }
}

/// IPv4 forwarder
#[derive(Debug, Default)]
pub struct Forwarder {
    icmp: IcmpSettings,
}

impl Forwarder {
    pub fn new(icmp: IcmpSettings) -> Self {
        Self { icmp }
    }

    /// Runs one datagram, carried by `eth`, through the pipeline.
    pub fn forward(
        &self,
        ctx: &ForwardContext<'_>,
        ingress: &Interface,
        eth: &Frame<'_>,
    ) -> ForwardOutcome {
        let header = match Ipv4Header::parse(eth.payload()) {
            Ok(h) => h,
            Err(e) => {
                debug!(interface = %ingress.name, error = %e, "Dropping malformed IPv4 datagram");
                return ForwardOutcome::new(ForwardAction::Dropped(DropReason::Malformed(
                    e.to_string(),
                )));
            }
        };

        if !header.validate_checksum() {
            debug!(
                interface = %ingress.name,
                src = %header.src_addr(),
                "Dropping datagram with bad header checksum"
            );
            return ForwardOutcome::new(ForwardAction::Dropped(DropReason::BadChecksum));
        }

        let dst = header.dst_addr();

        if header.ttl() < 1 {
            return self.icmp_reply(IcmpError::TtlExceeded, ingress, eth, &header);
        }

        let net = mask(dst, ingress.netmask);
        let route = match ctx
            .routes
            .lookup(net)
            .or_else(|| ctx.routes.lookup_default())
        {
            Some(r) => r,
            None => return self.icmp_reply(IcmpError::NetUnreachable, ingress, eth, &header),
        };

        let egress = match ctx.interface(route.interface) {
            Some(i) => i,
            None => {
                warn!(interface = route.interface, route = %route, "Route points at unknown interface");
                return ForwardOutcome::new(ForwardAction::Dropped(
                    DropReason::UnknownInterface(route.interface),
                ));
            }
        };

        let next_hop = route.next_hop(dst);
        let mut arp_request = None;
        let mut next_hop_mac = ctx.arp_cache.lookup(next_hop);
        if next_hop_mac.is_zero() {
            debug!(interface = %egress.name, next_hop = %next_hop, "Next hop unresolved, broadcasting ARP request");
            let request = ArpPacket::request(egress.mac, egress.ip, next_hop);
            arp_request = Some((egress.num, request.to_frame(MacAddr::BROADCAST)));

            // One immediate re-check; the reply, if any, arrives as a later frame.
            next_hop_mac = ctx.arp_cache.lookup(next_hop);
            if next_hop_mac.is_zero() {
                let mut outcome =
                    self.icmp_reply(IcmpError::HostUnreachable, ingress, eth, &header);
                outcome.arp_request = arp_request;
                return outcome;
            }
        }

        let budget = (egress.mtu as usize).saturating_sub(header.header_len());
        let needs_fragmentation = header.payload().len() > budget;
        if needs_fragmentation && header.dont_fragment() {
            let error = IcmpError::FragmentationNeeded { mtu: egress.mtu };
            let mut outcome = self.icmp_reply(error, ingress, eth, &header);
            outcome.arp_request = arp_request;
            return outcome;
        }

        let mut packet = match Ipv4Packet::from_bytes(header.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                return ForwardOutcome {
                    arp_request,
                    action: ForwardAction::Dropped(DropReason::Malformed(e.to_string())),
                }
            }
        };
        packet.decrement_ttl();

        let datagrams = if needs_fragmentation {
            match packet.fragment(budget) {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(interface = %egress.name, error = %e, "Cannot fragment datagram");
                    return ForwardOutcome {
                        arp_request,
                        action: ForwardAction::Dropped(DropReason::Malformed(e.to_string())),
                    };
                }
            }
        } else {
            vec![packet]
        };

        trace!(
            ingress = %ingress.name,
            egress = %egress.name,
            dst = %dst,
            next_hop = %next_hop,
            fragments = datagrams.len(),
            "Forwarding datagram"
        );

        let frames = datagrams
            .into_iter()
            .map(|datagram| {
                FrameBuilder::with_capacity(datagram.len())
                    .dst_mac(next_hop_mac)
                    .src_mac(egress.mac)
                    .ethertype(EtherType::Ipv4)
                    .payload(datagram.as_bytes())
                    .build()
            })
            .collect();

        ForwardOutcome {
            arp_request,
            action: ForwardAction::Forward {
                interface: egress.num,
                next_hop_mac,
                frames,
            },
        }
    }

    fn icmp_reply(
        &self,
        error: IcmpError,
        ingress: &Interface,
        eth: &Frame<'_>,
        header: &Ipv4Header<'_>,
    ) -> ForwardOutcome {
        debug!(
            interface = %ingress.name,
            src = %header.src_addr(),
            dst = %header.dst_addr(),
            icmp = %error,
            "Replying with ICMP error"
        );
        let frame = build_icmp_error(error, ingress, eth.src_mac(), header, &self.icmp);
        ForwardOutcome::new(ForwardAction::Icmp {
            error,
            interface: ingress.num,
            frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::interface::prefix_to_netmask;
    use crate::dataplane::routing::Route;
    use crate::protocol::arp::ArpOp;
    use crate::protocol::icmp::{IcmpPacket, IcmpType};
    use crate::protocol::ipv4::{Ipv4Builder, Protocol};
    use std::net::Ipv4Addr;

    const HOST_A: MacAddr = MacAddr([0x02, 0xaa, 0, 0, 0, 1]);
    const HOST_B: MacAddr = MacAddr([0x02, 0xbb, 0, 0, 0, 2]);
    const GATEWAY: MacAddr = MacAddr([0x02, 0xcc, 0, 0, 0, 3]);

    struct Fixture {
        interfaces: Vec<Interface>,
        routes: RoutingTable,
        arp_cache: ArpCache,
        forwarder: Forwarder,
    }

    impl Fixture {
        fn ctx(&self) -> ForwardContext<'_> {
            ForwardContext {
                interfaces: &self.interfaces,
                routes: &self.routes,
                arp_cache: &self.arp_cache,
            }
        }

        fn run(&self, ingress: IfNum, frame: &[u8]) -> ForwardOutcome {
            let eth = Frame::parse(frame).unwrap();
            let ingress = &self.interfaces[ingress as usize - 1];
            self.forwarder.forward(&self.ctx(), ingress, &eth)
        }
    }

    fn make_iface(num: IfNum, ip: [u8; 4], prefix: u8, mtu: u16) -> Interface {
        Interface {
            num,
            name: format!("eth{}", num - 1),
            mac: MacAddr([0x02, 0, 0, 0, 0, num as u8]),
            ip: Ipv4Addr::from(ip),
            netmask: prefix_to_netmask(prefix),
            mtu,
        }
    }

    /// eth0 10.0.0.1/24, eth1 10.0.1.1/24 (MTU 576), connected routes only.
    fn make_fixture() -> Fixture {
        let interfaces = vec![
            make_iface(1, [10, 0, 0, 1], 24, 1500),
            make_iface(2, [10, 0, 1, 1], 24, 576),
        ];
        let mut routes = RoutingTable::new();
        routes.install_connected(&interfaces);
        Fixture {
            interfaces,
            routes,
            arp_cache: ArpCache::default(),
            forwarder: Forwarder::default(),
        }
    }

    fn make_frame(dst: [u8; 4], ttl: u8, df: bool, payload_len: usize) -> Vec<u8> {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
        let datagram = Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(10, 0, 0, 2))
            .dst_addr(Ipv4Addr::from(dst))
            .identification(0x0BAD)
            .ttl(ttl)
            .dont_fragment(df)
            .protocol(Protocol::Udp as u8)
            .payload(&payload)
            .build();
        FrameBuilder::new()
            .dst_mac(MacAddr([0x02, 0, 0, 0, 0, 1]))
            .src_mac(HOST_A)
            .ethertype(EtherType::Ipv4)
            .payload(&datagram)
            .build()
    }

    fn icmp_of(frame: &[u8]) -> (u8, u8) {
        let eth = Frame::parse(frame).unwrap();
        let ip = Ipv4Header::parse(eth.payload()).unwrap();
        let icmp = IcmpPacket::parse(ip.payload()).unwrap();
        (icmp.icmp_type(), icmp.code())
    }

    #[test]
    fn test_forward_on_link() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        let outcome = fx.run(1, &make_frame([10, 0, 1, 9], 64, false, 100));
        assert!(outcome.arp_request.is_none());

        match outcome.action {
            ForwardAction::Forward {
                interface,
                next_hop_mac,
                frames,
            } => {
                assert_eq!(interface, 2);
                assert_eq!(next_hop_mac, HOST_B);
                assert_eq!(frames.len(), 1);

                let eth = Frame::parse(&frames[0]).unwrap();
                assert_eq!(eth.dst_mac(), HOST_B);
                assert_eq!(eth.src_mac(), fx.interfaces[1].mac);
                let ip = Ipv4Header::parse(eth.payload()).unwrap();
                assert_eq!(ip.ttl(), 63);
                assert!(ip.validate_checksum());
                assert_eq!(ip.payload().len(), 100);
            }
            other => panic!("Expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn test_forward_via_gateway() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 254), GATEWAY, 2);
        fx.routes.insert(Route::new_static(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(10, 0, 1, 254),
            2,
        ));

        let outcome = fx.run(1, &make_frame([8, 8, 8, 8], 64, false, 20));
        match outcome.action {
            ForwardAction::Forward {
                interface,
                next_hop_mac,
                ..
            } => {
                assert_eq!(interface, 2);
                assert_eq!(next_hop_mac, GATEWAY);
            }
            other => panic!("Expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn test_ttl_zero_yields_time_exceeded() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        let frames = fx
            .run(1, &make_frame([10, 0, 1, 9], 0, false, 30))
            .into_frames();

        assert_eq!(frames.len(), 1);
        let (iface, frame) = &frames[0];
        assert_eq!(*iface, 1);
        assert_eq!(icmp_of(frame), (IcmpType::TimeExceeded as u8, 0));
        assert_eq!(Frame::parse(frame).unwrap().dst_mac(), HOST_A);
    }

    #[test]
    fn test_ttl_one_is_forwarded() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        let outcome = fx.run(1, &make_frame([10, 0, 1, 9], 1, false, 30));
        match outcome.action {
            ForwardAction::Forward { frames, .. } => {
                let eth = Frame::parse(&frames[0]).unwrap();
                assert_eq!(Ipv4Header::parse(eth.payload()).unwrap().ttl(), 0);
            }
            other => panic!("Expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn test_no_route_yields_net_unreachable() {
        let fx = make_fixture();
        let outcome = fx.run(1, &make_frame([192, 168, 7, 7], 64, false, 30));

        match &outcome.action {
            ForwardAction::Icmp {
                error, interface, ..
            } => {
                assert_eq!(*error, IcmpError::NetUnreachable);
                assert_eq!(*interface, 1);
            }
            other => panic!("Expected Icmp, got {:?}", other),
        }
        let frames = outcome.into_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            icmp_of(&frames[0].1),
            (IcmpType::DestinationUnreachable as u8, 0)
        );
    }

    #[test]
    fn test_unresolved_next_hop_sends_arp_then_host_unreachable() {
        let fx = make_fixture();
        let frames = fx
            .run(1, &make_frame([10, 0, 1, 9], 64, false, 30))
            .into_frames();

        assert_eq!(frames.len(), 2);

        let (arp_iface, arp_frame) = &frames[0];
        assert_eq!(*arp_iface, 2);
        let eth = Frame::parse(arp_frame).unwrap();
        assert_eq!(eth.dst_mac(), MacAddr::BROADCAST);
        assert_eq!(eth.ethertype(), EtherType::Arp);
        let arp = ArpPacket::parse(eth.payload()).unwrap();
        assert_eq!(arp.operation, ArpOp::Request);
        assert_eq!(arp.sender_ip, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(arp.target_ip, Ipv4Addr::new(10, 0, 1, 9));

        let (icmp_iface, icmp_frame) = &frames[1];
        assert_eq!(*icmp_iface, 1);
        assert_eq!(
            icmp_of(icmp_frame),
            (IcmpType::DestinationUnreachable as u8, 1)
        );
    }

    #[test]
    fn test_bad_checksum_is_silent() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);
        let mut frame = make_frame([10, 0, 1, 9], 64, false, 30);
        frame[14 + 10] ^= 0x55;

        let outcome = fx.run(1, &frame);
        assert_eq!(
            outcome.action,
            ForwardAction::Dropped(DropReason::BadChecksum)
        );
        assert!(outcome.into_frames().is_empty());
    }

    #[test]
    fn test_truncated_datagram_is_silent() {
        let fx = make_fixture();
        let frame = make_frame([10, 0, 1, 9], 64, false, 30);
        let outcome = fx.run(1, &frame[..14 + 12]);
        assert!(matches!(
            outcome.action,
            ForwardAction::Dropped(DropReason::Malformed(_))
        ));
    }

    #[test]
    fn test_df_set_yields_fragmentation_needed() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        let outcome = fx.run(1, &make_frame([10, 0, 1, 9], 64, true, 1000));
        match outcome.action {
            ForwardAction::Icmp { error, frame, .. } => {
                assert_eq!(error, IcmpError::FragmentationNeeded { mtu: 576 });
                assert_eq!(
                    icmp_of(&frame),
                    (IcmpType::DestinationUnreachable as u8, 4)
                );
            }
            other => panic!("Expected Icmp, got {:?}", other),
        }
    }

    #[test]
    fn test_fragmentation() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        // Egress MTU 576: budget 556, rounded down to 552 per fragment.
        let payload_len = 1200;
        let outcome = fx.run(1, &make_frame([10, 0, 1, 9], 64, false, payload_len));

        let frames = match outcome.action {
            ForwardAction::Forward { frames, .. } => frames,
            other => panic!("Expected Forward, got {:?}", other),
        };
        assert_eq!(frames.len(), 3);

        let mut carried = 0;
        for (i, frame) in frames.iter().enumerate() {
            assert!(frame.len() <= fx.interfaces[1].max_frame_len());
            let eth = Frame::parse(frame).unwrap();
            let ip = Ipv4Header::parse(eth.payload()).unwrap();
            assert!(ip.validate_checksum());
            assert_eq!(ip.ttl(), 63);
            assert_eq!(ip.identification(), 0x0BAD);
            assert_eq!(ip.fragment_offset() as usize * 8, carried);
            assert_eq!(ip.more_fragments(), i < 2);
            if i < 2 {
                assert_eq!(ip.payload().len(), 552);
            }
            carried += ip.payload().len();
        }
        assert_eq!(carried, payload_len);
    }

    #[test]
    fn test_payload_at_budget_is_not_fragmented() {
        let mut fx = make_fixture();
        fx.arp_cache.learn(Ipv4Addr::new(10, 0, 1, 9), HOST_B, 2);

        let outcome = fx.run(1, &make_frame([10, 0, 1, 9], 64, true, 556));
        match outcome.action {
            ForwardAction::Forward { frames, .. } => assert_eq!(frames.len(), 1),
            other => panic!("Expected Forward, got {:?}", other),
        }
    }
}
