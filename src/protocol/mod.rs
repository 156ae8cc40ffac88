//! Wire formats: Ethernet II, ARP, IPv4 and ICMP.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod types;

pub use types::*;
