//! Forwarding Database (MAC address table)
//!
//! Source-MAC learning for the switch. The table is bounded; when it is
//! full the least recently learned entry is overwritten.

use super::interface::IfNum;
use crate::protocol::MacAddr;

/// Default number of table slots.
pub const DEFAULT_TABLE_SIZE: usize = 16;

/// FDB entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdbEntry {
    pub mac: MacAddr,
    pub port: IfNum,
    /// Logical time of the last learn; larger is newer.
    pub stamp: u64,
}

/// Result of a L2 forwarding decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L2ForwardAction {
    /// Forward to a specific port (unicast hit)
    Forward { port: IfNum },
    /// Flood to all ports except ingress (unknown unicast/broadcast/multicast)
    Flood { ports: Vec<IfNum> },
    /// Destination sits behind the ingress port
    Filter,
}

/// Forwarding Database for L2 switching
#[derive(Debug)]
pub struct Fdb {
    entries: Vec<FdbEntry>,
    capacity: usize,
    clock: u64,
}

impl Default for Fdb {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

impl Fdb {
    /// Creates a table holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            clock: 0,
        }
    }

    // ========================================
    // MAC Learning
    // ========================================

    /// Learn a MAC address on a port
    ///
    /// Broadcast and multicast sources are never learned. A known MAC is
    /// moved to `port` and refreshed.
    pub fn learn(&mut self, mac: MacAddr, port: IfNum) {
        if mac.is_broadcast() || mac.is_multicast() {
            return;
        }

        self.clock += 1;
        let stamp = self.clock;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.mac == mac) {
            entry.port = port;
            entry.stamp = stamp;
            return;
        }

        let entry = FdbEntry { mac, port, stamp };
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            let slot = self.oldest_slot();
            self.entries[slot] = entry;
        }
    }

    fn oldest_slot(&self) -> usize {
        let mut oldest = 0;
        for (i, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.stamp < self.entries[oldest].stamp {
                oldest = i;
            }
        }
        oldest
    }

    // ========================================
    // FDB Lookup
    // ========================================

    /// Look up the port for a destination MAC address
    pub fn lookup(&self, mac: MacAddr) -> Option<IfNum> {
        self.entries.iter().find(|e| e.mac == mac).map(|e| e.port)
    }

    /// Make a forwarding decision for a frame
    ///
    /// `ports` lists every port of the switch.
    pub fn forward_decision(
        &self,
        dst_mac: MacAddr,
        ingress_port: IfNum,
        ports: &[IfNum],
    ) -> L2ForwardAction {
        let flood = || L2ForwardAction::Flood {
            ports: ports
                .iter()
                .copied()
                .filter(|&p| p != ingress_port)
                .collect(),
        };

        if dst_mac.is_broadcast() || dst_mac.is_multicast() {
            return flood();
        }

        match self.lookup(dst_mac) {
            Some(port) if port == ingress_port => L2ForwardAction::Filter,
            Some(port) => L2ForwardAction::Forward { port },
            None => flood(),
        }
    }

    // ========================================
    // Table Management
    // ========================================

    pub fn entries(&self) -> impl Iterator<Item = &FdbEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
