//! Bounded ARP cache (IPv4 to MAC) with least-recently-learned eviction.

use super::interface::IfNum;
use crate::protocol::MacAddr;
use std::net::Ipv4Addr;

/// Default number of cache slots.
pub const DEFAULT_CAPACITY: usize = 10;

/// A learned IPv4 to MAC binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    /// Interface the binding was learned on.
    pub interface: IfNum,
    /// Logical time of the last learn; larger is newer.
    pub stamp: u64,
}

/// What a call to [`ArpCache::learn`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    /// New slot filled.
    Inserted,
    /// An entry keyed by the MAC or by the IP was updated in place.
    Refreshed,
    /// Two entries (one per key) collapsed into the MAC-keyed one.
    Merged { dropped: ArpEntry },
    /// Cache was full; the oldest entry was overwritten.
    Evicted { victim: ArpEntry },
}

/// Fixed-capacity ARP cache.
///
/// At most one entry exists per IP and per MAC. Slots are scanned
/// linearly; the capacity is small.
#[derive(Debug)]
pub struct ArpCache {
    entries: Vec<ArpEntry>,
    capacity: usize,
    clock: u64,
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ArpCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            clock: 0,
        }
    }

    /// Returns the MAC bound to `ip`, or [`MacAddr::ZERO`] on a miss.
    pub fn lookup(&self, ip: Ipv4Addr) -> MacAddr {
        self.get(ip).map(|e| e.mac).unwrap_or(MacAddr::ZERO)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.entries.iter().find(|e| e.ip == ip)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.get(ip).is_some()
    }

    /// Records that `ip` is at `mac`, reachable through `interface`.
    pub fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr, interface: IfNum) -> LearnOutcome {
        let stamp = self.tick();

        // An entry matching on MAC counts only as the MAC-keyed entry.
        let by_mac = self.entries.iter().position(|e| e.mac == mac);
        let by_ip = self
            .entries
            .iter()
            .enumerate()
            .position(|(i, e)| Some(i) != by_mac && e.ip == ip);

        match (by_mac, by_ip) {
            (Some(m), Some(i)) => {
                let entry = &mut self.entries[m];
                entry.ip = ip;
                entry.interface = interface;
                entry.stamp = stamp;
                let dropped = self.entries.remove(i);
                LearnOutcome::Merged { dropped }
            }
            (Some(m), None) => {
                let entry = &mut self.entries[m];
                entry.ip = ip;
                entry.interface = interface;
                entry.stamp = stamp;
                LearnOutcome::Refreshed
            }
            (None, Some(i)) => {
                let entry = &mut self.entries[i];
                entry.mac = mac;
                entry.interface = interface;
                entry.stamp = stamp;
                LearnOutcome::Refreshed
            }
            (None, None) => {
                let entry = ArpEntry {
                    ip,
                    mac,
                    interface,
                    stamp,
                };
                if self.entries.len() < self.capacity {
                    self.entries.push(entry);
                    LearnOutcome::Inserted
                } else {
                    let slot = self.oldest_slot();
                    let victim = std::mem::replace(&mut self.entries[slot], entry);
                    LearnOutcome::Evicted { victim }
                }
            }
        }
    }

    /// Index of the entry with the smallest stamp; the first one wins ties.
    fn oldest_slot(&self) -> usize {
        let mut oldest = 0;
        for (i, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.stamp < self.entries[oldest].stamp {
                oldest = i;
            }
        }
        oldest
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &ArpEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
