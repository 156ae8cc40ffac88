//! Configuration types

use crate::dataplane::{IcmpSettings, ARP_CACHE_SIZE, DEFAULT_ICMP_TTL, FDB_TABLE_SIZE};
use crate::telemetry::LogConfig;
use serde::Deserialize;

/// Tuning file (netkit.toml). Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub arp: ArpConfig,
    #[serde(default)]
    pub switch: SwitchConfig,
    #[serde(default)]
    pub icmp: IcmpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArpConfig {
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
        }
    }
}

fn default_cache_size() -> usize {
    ARP_CACHE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    #[serde(default = "default_table_size")]
    pub table_size: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            table_size: default_table_size(),
        }
    }
}

fn default_table_size() -> usize {
    FDB_TABLE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IcmpConfig {
    #[serde(default = "default_icmp_ttl")]
    pub ttl: u8,
    /// Cap on quoted payload bytes in ICMP errors.
    #[serde(default)]
    pub max_embedded: Option<usize>,
}

impl Default for IcmpConfig {
    fn default() -> Self {
        Self {
            ttl: default_icmp_ttl(),
            max_embedded: None,
        }
    }
}

fn default_icmp_ttl() -> u8 {
    DEFAULT_ICMP_TTL
}

impl IcmpConfig {
    pub fn settings(&self) -> IcmpSettings {
        IcmpSettings {
            ttl: self.ttl,
            max_embedded: self.max_embedded,
        }
    }
}
