//! Switch and hub over the transport
//!
//! Topology:
//! ```text
//! host1 -- p1 [switch|hub] p2 -- host2
//!                  |
//!                  p3 -- host3
//! ```

use super::session::{ethernet, frames, lines, Session};
use netkit::config::parse_interfaces;
use netkit::dataplane::{Hub, Port, Switch, FDB_TABLE_SIZE};
use netkit::protocol::{EtherType, MacAddr};
use netkit::telemetry::MetricsRegistry;
use std::sync::Arc;

const PORT_MACS: [MacAddr; 3] = [
    MacAddr([0x02, 0, 0, 0, 0, 1]),
    MacAddr([0x02, 0, 0, 0, 0, 2]),
    MacAddr([0x02, 0, 0, 0, 0, 3]),
];

fn host(n: u8) -> MacAddr {
    MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, n])
}

fn make_ports() -> Vec<Port> {
    let args: Vec<String> = ["p1", "p2", "p3"].iter().map(|s| s.to_string()).collect();
    Port::from_specs(&parse_interfaces(&args, false).unwrap())
}

fn frame(dst: MacAddr, src: MacAddr) -> Vec<u8> {
    ethernet(dst, src, EtherType::Ipv4, &[0xab; 46])
}

fn egress_ports(output: &[(u16, Vec<u8>)]) -> Vec<u16> {
    output.iter().map(|(p, _)| *p).collect()
}

// ===== switch =====

#[tokio::test]
async fn test_switch_learns_then_unicasts() {
    let mut switch = Switch::new(
        make_ports(),
        FDB_TABLE_SIZE,
        Arc::new(MetricsRegistry::new()),
    );
    let output = Session::new(&PORT_MACS)
        // Unknown destination floods and teaches host1 on p1.
        .frame(1, frame(host(2), host(1)))
        // host2 answers from p2; host1 is known, so only p1 receives it.
        .frame(2, frame(host(1), host(2)))
        // host1 to host2 is now unicast to p2.
        .frame(1, frame(host(2), host(1)))
        .run(&mut switch)
        .await;

    assert_eq!(egress_ports(&frames(&output)), vec![2, 3, 1, 2]);
    assert_eq!(switch.fdb().len(), 2);
}

#[tokio::test]
async fn test_switch_broadcast_and_same_port() {
    let mut switch = Switch::new(
        make_ports(),
        FDB_TABLE_SIZE,
        Arc::new(MetricsRegistry::new()),
    );
    let output = Session::new(&PORT_MACS)
        .frame(3, frame(MacAddr::BROADCAST, host(3)))
        .frame(3, frame(MacAddr::BROADCAST, host(4)))
        // host3 and host4 share p3, so this stays there.
        .frame(3, frame(host(3), host(4)))
        .run(&mut switch)
        .await;

    assert_eq!(egress_ports(&frames(&output)), vec![1, 2, 1, 2]);
}

#[tokio::test]
async fn test_switch_table_is_bounded() {
    let mut switch = Switch::new(make_ports(), 4, Arc::new(MetricsRegistry::new()));
    let mut session = Session::new(&PORT_MACS);
    for n in 1..=6 {
        session = session.frame(1, frame(MacAddr::BROADCAST, host(n)));
    }
    session.run(&mut switch).await;

    assert_eq!(switch.fdb().len(), 4);
    // The two oldest entries were evicted.
    assert_eq!(switch.fdb().lookup(host(1)), None);
    assert_eq!(switch.fdb().lookup(host(2)), None);
    assert_eq!(switch.fdb().lookup(host(6)), Some(1));
}

#[tokio::test]
async fn test_switch_ignores_commands() {
    let mut switch = Switch::new(
        make_ports(),
        FDB_TABLE_SIZE,
        Arc::new(MetricsRegistry::new()),
    );
    let output = Session::new(&PORT_MACS)
        .command("route list")
        .run(&mut switch)
        .await;

    assert_eq!(
        lines(&output),
        vec!["Received command `route list' (ignored)\n"]
    );
}

// ===== hub =====

#[tokio::test]
async fn test_hub_floods_to_other_ports() {
    let mut hub = Hub::new(make_ports(), Arc::new(MetricsRegistry::new()));
    let sent = frame(host(2), host(1));
    let output = Session::new(&PORT_MACS)
        .frame(2, sent.clone())
        .run(&mut hub)
        .await;

    let out = frames(&output);
    assert_eq!(egress_ports(&out), vec![1, 3]);
    assert!(out.iter().all(|(_, f)| *f == sent));
}
