//! Metrics collection for packet statistics.
//!
//! Counters at both the global and per-interface level.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
    /// Frames received but neither forwarded nor answered.
    pub rx_drops: Counter,
}

impl InterfaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received frame.
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Records a transmitted frame.
    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }

    /// Records a receive drop.
    pub fn record_rx_drop(&self) {
        self.rx_drops.inc();
    }
}

/// Metrics registry shared by every tool.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-interface statistics, keyed by interface name.
    interfaces: RwLock<BTreeMap<String, InterfaceStats>>,

    // Forwarding metrics
    /// Datagrams sent on towards their next hop.
    pub packets_forwarded: Counter,
    /// Fragments emitted; a datagram split in three counts three.
    pub fragments_sent: Counter,
    /// Datagrams discarded without a reply.
    pub packets_dropped: Counter,

    // ICMP metrics
    pub icmp_errors_sent: Counter,

    // ARP metrics
    pub arp_requests_sent: Counter,
    pub arp_replies_sent: Counter,

    // Table size gauges
    pub arp_cache_size: AtomicU64,
    pub route_count: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        let mut interfaces = self
            .interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        interfaces.entry(name.to_string()).or_default();
    }

    fn with_interface(&self, interface: &str, f: impl FnOnce(&InterfaceStats)) {
        let interfaces = self
            .interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = interfaces.get(interface) {
            f(stats);
        }
    }

    /// Records a received frame on an interface.
    pub fn record_rx(&self, interface: &str, bytes: usize) {
        self.with_interface(interface, |s| s.record_rx(bytes));
    }

    /// Records a transmitted frame on an interface.
    pub fn record_tx(&self, interface: &str, bytes: usize) {
        self.with_interface(interface, |s| s.record_tx(bytes));
    }

    /// Records a receive drop on an interface.
    pub fn record_rx_drop(&self, interface: &str) {
        self.with_interface(interface, InterfaceStats::record_rx_drop);
    }

    /// Updates the ARP cache size gauge.
    pub fn set_arp_cache_size(&self, size: usize) {
        self.arp_cache_size.store(size as u64, Ordering::Relaxed);
    }

    /// Updates the route count gauge.
    pub fn set_route_count(&self, count: usize) {
        self.route_count.store(count as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("packets_forwarded".into(), self.packets_forwarded.get()),
            ("fragments_sent".into(), self.fragments_sent.get()),
            ("packets_dropped".into(), self.packets_dropped.get()),
            ("icmp_errors_sent".into(), self.icmp_errors_sent.get()),
            ("arp_requests_sent".into(), self.arp_requests_sent.get()),
            ("arp_replies_sent".into(), self.arp_replies_sent.get()),
            (
                "arp_cache_size".into(),
                self.arp_cache_size.load(Ordering::Relaxed),
            ),
            (
                "route_count".into(),
                self.route_count.load(Ordering::Relaxed),
            ),
        ];

        let interfaces = self
            .interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, stats) in interfaces.iter() {
            result.extend([
                (format!("{}_rx_packets", name), stats.rx_packets.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_packets", name), stats.tx_packets.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_drops", name), stats.rx_drops.get()),
            ]);
        }

        result
    }

    /// Value of one exported metric, if it exists.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.export()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}
