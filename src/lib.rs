//! Netkit - userspace hub, switch, ARP resolver and IPv4 router
//!
//! Each tool exchanges raw Ethernet frames with a frame-delivery process
//! over a framed byte stream. All protocol logic lives in userspace.

pub mod app;
pub mod command;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod transport;

pub use error::{Error, Result};
