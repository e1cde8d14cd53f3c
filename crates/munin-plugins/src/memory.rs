//! Used and free memory from `/proc/meminfo`.

use std::fmt::Write;
use std::path::PathBuf;

use munin_core::{Plugin, PluginError, PluginOutput, PluginResult};

use crate::read_source;

const MEMINFO: &str = "/proc/meminfo";

/// Memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Total minus available memory.
    pub used: u64,
    /// Available memory, or `MemFree` on kernels without `MemAvailable`.
    pub free: u64,
}

/// Reports used and free memory.
#[derive(Debug, Clone)]
pub struct MemoryPlugin {
    source: PathBuf,
}

impl MemoryPlugin {
    /// Reads the system `/proc/meminfo`.
    pub fn new() -> Self {
        Self::with_source(MEMINFO)
    }

    /// Reads a file in `/proc/meminfo` format at `source`.
    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Default for MemoryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MemoryPlugin {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_config(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        out.put_str(
            "graph_title Memory usage\n\
             graph_args --base 1024 -l 0\n\
             graph_vlabel Bytes\n\
             graph_category system\n\
             used.label used\n\
             used.draw AREA\n\
             free.label free\n\
             free.draw STACK\n",
        );
        Ok(())
    }

    fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        let usage = parse_meminfo(&read_source(&self.source)?)?;
        writeln!(out, "used.value {}", usage.used)?;
        writeln!(out, "free.value {}", usage.free)?;
        Ok(())
    }
}

/// Computes usage from `MemTotal` and `MemAvailable`, falling back to
/// `MemFree` on kernels without `MemAvailable`.
pub fn parse_meminfo(text: &str) -> PluginResult<MemoryUsage> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let slot = match key {
            "MemTotal" => &mut total,
            "MemAvailable" => &mut available,
            "MemFree" => &mut free,
            _ => continue,
        };
        *slot = Some(parse_kib(key, rest)?);
    }

    let total = total.ok_or_else(|| PluginError::unavailable("meminfo: missing MemTotal"))?;
    let free = available
        .or(free)
        .ok_or_else(|| PluginError::unavailable("meminfo: missing MemFree"))?
        .min(total);

    Ok(MemoryUsage {
        used: total - free,
        free,
    })
}

/// Parses `"  16318480 kB"` into bytes.
fn parse_kib(key: &str, value: &str) -> PluginResult<u64> {
    let number = value.trim().trim_end_matches("kB").trim_end();
    let kib = number
        .parse::<u64>()
        .map_err(|_| PluginError::unavailable(format!("meminfo: invalid {key} value {value:?}")))?;
    kib.checked_mul(1024)
        .ok_or_else(|| PluginError::unavailable(format!("meminfo: {key} value out of range")))
}
