//! Five-minute load average.

use std::fmt::Write;
use std::path::PathBuf;

use munin_core::{Plugin, PluginError, PluginOutput, PluginResult};

use crate::read_source;

const LOADAVG: &str = "/proc/loadavg";

/// Reports the 5-minute load average from `/proc/loadavg`.
#[derive(Debug, Clone)]
pub struct LoadPlugin {
    source: PathBuf,
}

impl LoadPlugin {
    /// Reads the system `/proc/loadavg`.
    pub fn new() -> Self {
        Self::with_source(LOADAVG)
    }

    /// Reads a file in `/proc/loadavg` format at `source`.
    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl Default for LoadPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LoadPlugin {
    fn name(&self) -> &str {
        "load"
    }

    fn write_config(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        out.put_str(
            "graph_title Load average\n\
             graph_args --base 1000 -l 0\n\
             graph_vlabel load\n\
             graph_scale no\n\
             graph_category system\n\
             load.label load\n",
        );
        Ok(())
    }

    fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        let load = parse_loadavg(&read_source(&self.source)?)?;
        writeln!(out, "load.value {load:.2}")?;
        Ok(())
    }
}

/// Extracts the 5-minute average, the second field.
pub fn parse_loadavg(text: &str) -> PluginResult<f64> {
    let field = text
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| PluginError::unavailable("loadavg: missing 5-minute field"))?;
    field
        .parse()
        .map_err(|_| PluginError::unavailable(format!("loadavg: invalid value {field:?}")))
}
