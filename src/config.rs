use std::env;
use std::str::FromStr;

use tracing::warn;

const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;
const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Tunables for a single connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Largest bulk string the decoder will accept. Matches the server side 512 MB limit.
    pub max_bulk_len: usize,
    /// Longest header or simple string line, excluding the `\r\n`.
    pub max_line_len: usize,
    pub read_buffer_capacity: usize,
    pub write_buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            read_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            write_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Config {
    /// Reads `RUSTDIS_MAX_BULK_LEN`, `RUSTDIS_MAX_LINE_LEN`, `RUSTDIS_READ_BUFFER` and
    /// `RUSTDIS_WRITE_BUFFER`, keeping the default for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_bulk_len: var_or("RUSTDIS_MAX_BULK_LEN", default.max_bulk_len),
            max_line_len: var_or("RUSTDIS_MAX_LINE_LEN", default.max_line_len),
            read_buffer_capacity: var_or("RUSTDIS_READ_BUFFER", default.read_buffer_capacity),
            write_buffer_capacity: var_or("RUSTDIS_WRITE_BUFFER", default.write_buffer_capacity),
        }
    }
}

fn var_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "ignoring invalid configuration value");
            default
        }),
        Err(_) => default,
    }
}
