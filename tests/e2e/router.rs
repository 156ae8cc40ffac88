//! Router and ARP resolver over the transport
//!
//! Topology:
//! ```text
//! host A 10.0.0.2 -- eth0 10.0.0.1/24 [router] eth1 10.0.1.1/24 mtu 576 -- host B 10.0.1.2
//!                                                                       -- gw     10.0.1.254
//! ```

use super::session::{datagram, ethernet, frames, lines, Session};
use netkit::config::parse_interfaces;
use netkit::dataplane::{Interface, Router, RouterMode, RouterSettings};
use netkit::protocol::arp::{ArpOp, ArpPacket};
use netkit::protocol::ethernet::Frame;
use netkit::protocol::icmp::IcmpPacket;
use netkit::protocol::ipv4::Ipv4Header;
use netkit::protocol::{EtherType, MacAddr};
use netkit::telemetry::MetricsRegistry;
use std::net::Ipv4Addr;
use std::sync::Arc;

const R0: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
const R1: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);
const HOST_A: MacAddr = MacAddr([0x02, 0xaa, 0, 0, 0, 0x02]);
const HOST_B: MacAddr = MacAddr([0x02, 0xbb, 0, 0, 0, 0x02]);
const GW: MacAddr = MacAddr([0x02, 0xcc, 0, 0, 0, 0xfe]);

const A_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const B_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
const GW_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 254);
const ETH0_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const ETH1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);

fn make_router(mode: RouterMode) -> Router {
    let args = vec![
        "eth0[IPV4:10.0.0.1/24]".to_string(),
        "eth1[IPV4:10.0.1.1/24]=576".to_string(),
    ];
    let interfaces = parse_interfaces(&args, true)
        .unwrap()
        .iter()
        .zip(1..)
        .map(|(spec, num)| Interface::from_spec(num, spec).unwrap())
        .collect();
    Router::new(
        mode,
        interfaces,
        RouterSettings::default(),
        Arc::new(MetricsRegistry::new()),
    )
}

fn session() -> Session {
    Session::new(&[R0, R1])
}

/// ARP reply from a neighbour on eth1 addressed to the router.
fn arp_reply_on_eth1(mac: MacAddr, ip: Ipv4Addr) -> Vec<u8> {
    ArpPacket::reply(mac, ip, R1, ETH1_IP).to_frame(R1)
}

fn from_host_a(dst: Ipv4Addr, ttl: u8, df: bool, payload_len: usize) -> Vec<u8> {
    ethernet(
        R0,
        HOST_A,
        EtherType::Ipv4,
        &datagram(A_IP, dst, ttl, df, payload_len),
    )
}

/// (type, code, next-hop MTU) of an ICMP error frame.
fn icmp_of(frame: &[u8]) -> (u8, u8, u16) {
    let eth = Frame::parse(frame).unwrap();
    let ip = Ipv4Header::parse(eth.payload()).unwrap();
    let icmp = IcmpPacket::parse(ip.payload()).unwrap();
    (icmp.icmp_type(), icmp.code(), icmp.next_hop_mtu())
}

// ===== forwarding =====

#[tokio::test]
async fn test_forward_after_learning_neighbour() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, from_host_a(B_IP, 64, false, 100))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    let (interface, frame) = &out[0];
    assert_eq!(*interface, 2);

    let eth = Frame::parse(frame).unwrap();
    assert_eq!(eth.dst_mac(), HOST_B);
    assert_eq!(eth.src_mac(), R1);
    let ip = Ipv4Header::parse(eth.payload()).unwrap();
    assert_eq!(ip.ttl(), 63);
    assert!(ip.validate_checksum());
    assert_eq!(ip.dst_addr(), B_IP);

    assert_eq!(router.metrics().packets_forwarded.get(), 1);
}

#[tokio::test]
async fn test_ttl_zero_returns_time_exceeded() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, from_host_a(B_IP, 0, false, 40))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 1);
    assert_eq!(icmp_of(&out[0].1).0, 11);

    let eth = Frame::parse(&out[0].1).unwrap();
    assert_eq!(eth.dst_mac(), HOST_A);
    let ip = Ipv4Header::parse(eth.payload()).unwrap();
    assert_eq!(ip.src_addr(), ETH0_IP);
    assert_eq!(ip.dst_addr(), A_IP);
}

#[tokio::test]
async fn test_unknown_network_returns_net_unreachable() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(1, from_host_a(Ipv4Addr::new(172, 16, 0, 1), 64, false, 40))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 1);
    assert_eq!(icmp_of(&out[0].1), (3, 0, 0));
}

#[tokio::test]
async fn test_unresolved_next_hop_requests_and_reports() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(1, from_host_a(B_IP, 64, false, 40))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 2);

    let (interface, request) = &out[0];
    assert_eq!(*interface, 2);
    let eth = Frame::parse(request).unwrap();
    assert_eq!(eth.dst_mac(), MacAddr::BROADCAST);
    let arp = ArpPacket::parse(eth.payload()).unwrap();
    assert_eq!(arp.operation, ArpOp::Request);
    assert_eq!(arp.sender_ip, ETH1_IP);
    assert_eq!(arp.target_ip, B_IP);

    assert_eq!(out[1].0, 1);
    assert_eq!(icmp_of(&out[1].1), (3, 1, 0));
}

#[tokio::test]
async fn test_bad_checksum_is_dropped_silently() {
    let mut router = make_router(RouterMode::Router);
    let mut frame = from_host_a(B_IP, 64, false, 40);
    // Corrupt the IPv4 checksum.
    frame[14 + 10] ^= 0xff;

    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, frame)
        .run(&mut router)
        .await;

    assert!(output.is_empty());
    assert_eq!(router.metrics().packets_dropped.get(), 1);
}

// ===== fragmentation =====

#[tokio::test]
async fn test_large_datagram_is_fragmented() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, from_host_a(B_IP, 64, false, 1200))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 3);

    let mut expected_offset = 0;
    let mut total = 0;
    for (i, (interface, frame)) in out.iter().enumerate() {
        assert_eq!(*interface, 2);
        assert!(frame.len() <= 576 + 14);

        let ip = Ipv4Header::parse(Frame::parse(frame).unwrap().payload()).unwrap();
        assert!(ip.validate_checksum());
        assert_eq!(ip.identification(), 0x4242);
        assert_eq!(ip.fragment_offset() as usize * 8, expected_offset);
        assert_eq!(ip.more_fragments(), i < 2);
        assert!(ip.payload().len() % 8 == 0 || i == 2);

        expected_offset += ip.payload().len();
        total += ip.payload().len();
    }
    assert_eq!(total, 1200);
    assert_eq!(router.metrics().fragments_sent.get(), 3);
}

#[tokio::test]
async fn test_dont_fragment_returns_fragmentation_needed() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, from_host_a(B_IP, 64, true, 1200))
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 1);
    assert_eq!(icmp_of(&out[0].1), (3, 4, 576));
}

// ===== routes =====

#[tokio::test]
async fn test_static_route_add_list_and_delete() {
    let mut router = make_router(RouterMode::Router);
    let remote = Ipv4Addr::new(192, 168, 5, 5);

    let output = session()
        .frame(2, arp_reply_on_eth1(GW, GW_IP))
        .command("route add 192.168.5.0/24 via 10.0.1.254 dev ETH1")
        .command("route list")
        .frame(1, from_host_a(remote, 64, false, 40))
        .command("route del 192.168.5.0/24 via 10.0.1.254 dev eth1")
        .frame(1, from_host_a(remote, 64, false, 40))
        .run(&mut router)
        .await;

    assert_eq!(
        lines(&output),
        vec![
            "10.0.0.0/255.255.255.0 -> 0.0.0.0 (eth0)\n",
            "10.0.1.0/255.255.255.0 -> 0.0.0.0 (eth1)\n",
            "192.168.5.0/255.255.255.0 -> 10.0.1.254 (eth1)\n",
        ]
    );

    let out = frames(&output);
    assert_eq!(out.len(), 2);

    // Routed through the gateway while the route exists.
    assert_eq!(out[0].0, 2);
    assert_eq!(Frame::parse(&out[0].1).unwrap().dst_mac(), GW);

    // Net unreachable once it is deleted.
    assert_eq!(out[1].0, 1);
    assert_eq!(icmp_of(&out[1].1), (3, 0, 0));
}

#[tokio::test]
async fn test_route_add_needs_cached_gateway() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .command("route add 192.168.5.0/24 via 10.0.1.254 dev eth1")
        .command("route")
        .run(&mut router)
        .await;

    // Rejected without feedback; only the two connected routes remain.
    assert!(frames(&output).is_empty());
    assert_eq!(lines(&output).len(), 2);
    assert_eq!(router.routes().len(), 2);
}

#[tokio::test]
async fn test_command_errors_are_reported() {
    let mut router = make_router(RouterMode::Router);
    let output = session()
        .command("route add 192.168.5.0/24 via 10.0.1.254 dev wlan0")
        .command("route add 192.168.5.0/24 to 10.0.1.254")
        .command("ping 10.0.0.2")
        .run(&mut router)
        .await;

    assert_eq!(
        lines(&output),
        vec![
            "Interface `wlan0' unknown\n",
            "Expected `via', not `to'\n",
            "Unsupported command `ping'\n",
        ]
    );
}

// ===== arp =====

#[tokio::test]
async fn test_arp_request_for_router_is_answered() {
    let mut router = make_router(RouterMode::Router);
    let request = ArpPacket::request(HOST_A, A_IP, ETH0_IP).to_frame(MacAddr::BROADCAST);
    let output = session().frame(1, request).run(&mut router).await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 1);

    let eth = Frame::parse(&out[0].1).unwrap();
    assert_eq!(eth.dst_mac(), HOST_A);
    let reply = ArpPacket::parse(eth.payload()).unwrap();
    assert_eq!(reply.operation, ArpOp::Reply);
    assert_eq!(reply.sender_mac, R0);
    assert_eq!(reply.sender_ip, ETH0_IP);
    assert_eq!(reply.target_mac, HOST_A);
    assert_eq!(reply.target_ip, A_IP);

    // Requests never populate the cache.
    assert!(router.arp_cache().is_empty());
}

#[tokio::test]
async fn test_arp_command_resolves_and_lists() {
    let mut router = make_router(RouterMode::ArpResolver);
    let output = session()
        .command("arp 10.0.1.2 eth1")
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .command("arp 10.0.1.2 eth1")
        .command("arp")
        .run(&mut router)
        .await;

    let out = frames(&output);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 2);
    let request = ArpPacket::parse(Frame::parse(&out[0].1).unwrap().payload()).unwrap();
    assert_eq!(request.operation, ArpOp::Request);
    assert_eq!(request.target_ip, B_IP);

    assert_eq!(
        lines(&output),
        vec![
            format!("{}\n", HOST_B),
            format!("10.0.1.2 -> {} (eth1)\n", HOST_B),
        ]
    );
}

#[tokio::test]
async fn test_arp_resolver_ignores_ipv4_and_routes() {
    let mut router = make_router(RouterMode::ArpResolver);
    let output = session()
        .frame(2, arp_reply_on_eth1(HOST_B, B_IP))
        .frame(1, from_host_a(B_IP, 64, false, 40))
        .command("route list")
        .run(&mut router)
        .await;

    assert!(frames(&output).is_empty());
    assert_eq!(lines(&output), vec!["Unsupported command `route'\n"]);
    assert!(router.routes().is_empty());
}
