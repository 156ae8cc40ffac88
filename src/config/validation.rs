//! Configuration validation

use super::Config;

/// Upper bound for cache and table sizes.
pub const MAX_TABLE_SIZE: usize = 1024;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_tables(config, &mut result);
    validate_icmp(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        result.error(format!(
            "logging.level: unknown level `{}' (expected one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    let format = config.logging.format.to_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        result.error(format!(
            "logging.format: unknown format `{}' (expected one of {})",
            config.logging.format,
            LOG_FORMATS.join(", ")
        ));
    }
}

fn check_size(key: &str, size: usize, result: &mut ValidationResult) {
    if size == 0 {
        result.error(format!("{}: must be at least 1", key));
    } else if size > MAX_TABLE_SIZE {
        result.error(format!(
            "{}: {} exceeds the maximum of {}",
            key, size, MAX_TABLE_SIZE
        ));
    }
}

fn validate_tables(config: &Config, result: &mut ValidationResult) {
    check_size("arp.cache_size", config.arp.cache_size, result);
    check_size("switch.table_size", config.switch.table_size, result);

    if config.arp.cache_size == 1 {
        result.warn("arp.cache_size: a single entry will thrash on every new neighbour");
    }
}

fn validate_icmp(config: &Config, result: &mut ValidationResult) {
    if config.icmp.ttl == 0 {
        result.error("icmp.ttl: must be at least 1");
    }

    if let Some(cap) = config.icmp.max_embedded {
        if cap < 8 {
            result.warn(format!(
                "icmp.max_embedded: {} bytes is less than the 8 bytes RFC 792 asks for",
                cap
            ));
        }
    }
}
