//! Data plane components
//!
//! Handles frame processing: ARP, IPv4 forwarding and L2 bridging.

mod arp_cache;
mod arp_processor;
mod fdb;
mod forwarder;
mod hub;
mod icmp_error;
mod interface;
mod router;
mod routing;
mod switch;

/// A frame to transmit, tagged with its egress interface.
pub type Outbound = (IfNum, Vec<u8>);

pub use arp_cache::{ArpCache, ArpEntry, LearnOutcome, DEFAULT_CAPACITY as ARP_CACHE_SIZE};
pub use arp_processor::{process_arp, ArpAction};
pub use fdb::{Fdb, FdbEntry, L2ForwardAction, DEFAULT_TABLE_SIZE as FDB_TABLE_SIZE};
pub use forwarder::{DropReason, ForwardAction, ForwardContext, ForwardOutcome, Forwarder};
pub use hub::Hub;
pub use icmp_error::{build_icmp_error, IcmpSettings, DEFAULT_ICMP_TTL};
pub use interface::{mask, netmask_to_prefix, prefix_to_netmask, IfNum, Interface, Port};
pub use router::{Router, RouterMode, RouterSettings};
pub use routing::{Route, RouteSource, RoutingTable};
pub use switch::Switch;
