//! MAC-learning switch

use super::fdb::{Fdb, L2ForwardAction};
use super::interface::{IfNum, Port};
use super::Outbound;
use crate::protocol::ethernet::Frame;
use crate::protocol::MacAddr;
use crate::telemetry::MetricsRegistry;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

pub struct Switch {
    ports: Vec<Port>,
    fdb: Fdb,
    metrics: Arc<MetricsRegistry>,
}

impl Switch {
    pub fn new(ports: Vec<Port>, table_size: usize, metrics: Arc<MetricsRegistry>) -> Self {
        for port in &ports {
            metrics.register_interface(&port.name);
        }
        Self {
            ports,
            fdb: Fdb::new(table_size),
            metrics,
        }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn fdb(&self) -> &Fdb {
        &self.fdb
    }

    pub fn set_macs(&mut self, macs: &[MacAddr]) {
        for (port, mac) in self.ports.iter_mut().zip(macs) {
            port.mac = *mac;
            info!(interface = %port.name, mac = %mac, "Port up");
        }
    }

    fn is_own_mac(&self, mac: MacAddr) -> bool {
        self.ports.iter().any(|p| p.mac == mac)
    }

    /// Learn the source, then forward, flood or filter.
    pub fn process_frame(&mut self, ifnum: IfNum, data: &[u8]) -> Vec<Outbound> {
        let Some(ingress) = ifnum
            .checked_sub(1)
            .and_then(|i| self.ports.get(i as usize))
        else {
            error!(
                interface = ifnum,
                count = self.ports.len(),
                "Frame tagged with an interface that does not exist"
            );
            return Vec::new();
        };
        self.metrics.record_rx(&ingress.name, data.len());

        let frame = match Frame::parse(data) {
            Ok(f) => f,
            Err(e) => {
                debug!(interface = %ingress.name, error = %e, "Malformed frame");
                self.metrics.record_rx_drop(&ingress.name);
                return Vec::new();
            }
        };

        let src = frame.src_mac();
        if !self.is_own_mac(src) {
            self.fdb.learn(src, ifnum);
        }

        let port_nums: Vec<IfNum> = self.ports.iter().map(|p| p.num).collect();
        let egress = match self.fdb.forward_decision(frame.dst_mac(), ifnum, &port_nums) {
            L2ForwardAction::Forward { port } => vec![port],
            L2ForwardAction::Flood { ports } => ports,
            L2ForwardAction::Filter => {
                trace!(dst = %frame.dst_mac(), "Destination behind ingress port, filtered");
                if let Some(port) = self.ports.get(ifnum as usize - 1) {
                    self.metrics.record_rx_drop(&port.name);
                }
                Vec::new()
            }
        };

        egress
            .into_iter()
            .map(|num| {
                if let Some(port) = self.ports.get(num as usize - 1) {
                    self.metrics.record_tx(&port.name, data.len());
                }
                (num, data.to_vec())
            })
            .collect()
    }
}
