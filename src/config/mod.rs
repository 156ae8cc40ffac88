//! Configuration management
//!
//! Interfaces come from the command line; an optional TOML file tunes
//! table sizes, ICMP replies and logging.

mod interface;
mod types;
mod validation;

pub use interface::*;
pub use types::*;
pub use validation::{validate, ValidationResult, MAX_TABLE_SIZE};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Parse interface arguments, numbering them from 1 in order.
///
/// With `addressed` set every argument must carry `[IPV4:...]`;
/// otherwise the arguments are bare names.
pub fn parse_interfaces(args: &[String], addressed: bool) -> Result<Vec<InterfaceSpec>> {
    let specs = args
        .iter()
        .map(|arg| {
            if addressed {
                arg.parse::<InterfaceSpec>()
            } else {
                InterfaceSpec::bare(arg)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if specs.is_empty() {
        return Err(Error::Config("no interfaces given".into()));
    }
    Ok(specs)
}
