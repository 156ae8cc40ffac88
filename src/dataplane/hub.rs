//! Hub: every frame goes out every other port.

use super::interface::{IfNum, Port};
use super::Outbound;
use crate::protocol::MacAddr;
use crate::telemetry::MetricsRegistry;
use std::sync::Arc;
use tracing::{error, info};

pub struct Hub {
    ports: Vec<Port>,
    metrics: Arc<MetricsRegistry>,
}

impl Hub {
    pub fn new(ports: Vec<Port>, metrics: Arc<MetricsRegistry>) -> Self {
        for port in &ports {
            metrics.register_interface(&port.name);
        }
        Self { ports, metrics }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn set_macs(&mut self, macs: &[MacAddr]) {
        for (port, mac) in self.ports.iter_mut().zip(macs) {
            port.mac = *mac;
            info!(interface = %port.name, mac = %mac, "Port up");
        }
    }

    pub fn process_frame(&mut self, ifnum: IfNum, data: &[u8]) -> Vec<Outbound> {
        if ifnum == 0 || ifnum as usize > self.ports.len() {
            error!(
                interface = ifnum,
                count = self.ports.len(),
                "Frame tagged with an interface that does not exist"
            );
            return Vec::new();
        }

        self.ports
            .iter()
            .filter(|p| {
                if p.num == ifnum {
                    self.metrics.record_rx(&p.name, data.len());
                    false
                } else {
                    true
                }
            })
            .map(|p| {
                self.metrics.record_tx(&p.name, data.len());
                (p.num, data.to_vec())
            })
            .collect()
    }
}
