//! ARP packet processor
//!
//! Answers requests for local addresses and feeds replies into the cache.

use super::arp_cache::{ArpCache, LearnOutcome};
use super::interface::Interface;
use crate::protocol::arp::{ArpOp, ArpPacket};
use tracing::{debug, warn};

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpAction {
    /// Nothing to do
    None,
    /// Send this reply back to the requester over the ingress interface
    Reply(ArpPacket),
    /// A reply was learned into the cache
    Learned(LearnOutcome),
    /// A reply addressed to someone else
    NotForUs,
}

/// Processes an ARP packet received on `ingress`.
///
/// A request is answered when its target is the address of any local
/// interface; the reply leaves through `ingress` with that interface's
/// MAC. A reply is learned only when it targets `ingress` and was not
/// sent by `ingress` itself. Requests never update the cache.
pub fn process_arp(
    packet: &ArpPacket,
    ingress: &Interface,
    interfaces: &[Interface],
    cache: &mut ArpCache,
) -> ArpAction {
    match packet.operation {
        ArpOp::Request => {
            if !interfaces.iter().any(|i| i.ip == packet.target_ip) {
                return ArpAction::None;
            }
            debug!(
                interface = %ingress.name,
                requester = %packet.sender_ip,
                target = %packet.target_ip,
                "Answering ARP request"
            );
            ArpAction::Reply(ArpPacket::reply(
                ingress.mac,
                packet.target_ip,
                packet.sender_mac,
                packet.sender_ip,
            ))
        }
        ArpOp::Reply => {
            if packet.sender_ip == ingress.ip {
                // Our own reply looped back.
                return ArpAction::None;
            }
            if packet.target_ip != ingress.ip {
                warn!(
                    interface = %ingress.name,
                    sender = %packet.sender_ip,
                    target = %packet.target_ip,
                    "Received ARP reply that is not for me"
                );
                return ArpAction::NotForUs;
            }
            let outcome = cache.learn(packet.sender_ip, packet.sender_mac, ingress.num);
            debug!(
                interface = %ingress.name,
                ip = %packet.sender_ip,
                mac = %packet.sender_mac,
                outcome = ?outcome,
                "Learned ARP binding"
            );
            ArpAction::Learned(outcome)
        }
    }
}
