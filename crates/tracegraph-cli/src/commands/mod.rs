pub mod follow;
pub mod replay;

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use tracegraph_core::StoreConfig;

/// Install env_logger. `RUST_LOG` wins; otherwise warn, or debug with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

/// Build the store configuration from CLI flags.
pub fn store_config(reentrancy_limit: usize, strict_timestamps: bool) -> StoreConfig {
    StoreConfig {
        reentrancy_limit: reentrancy_limit.max(1),
        stamp_missing_timestamps: !strict_timestamps,
    }
}

/// Open a message file, or stdin for "-".
pub fn open_input(path: &str) -> io::Result<Box<dyn BufRead>> {
    if path == "-" {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Split a comma-separated channel filter, dropping empty entries.
pub fn parse_channels(filter: &str) -> Vec<String> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
