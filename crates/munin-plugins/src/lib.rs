//! Built-in plugins shipped with the Munin node.
//!
//! | Plugin | Source | Fields |
//! |--------|--------|--------|
//! | [`UptimePlugin`] | process start time | `uptime` (days) |
//! | [`LoadPlugin`] | `/proc/loadavg` | `load` (5-minute average) |
//! | [`MemoryPlugin`] | `/proc/meminfo` | `used`, `free` (bytes) |
//!
//! # Loading built-in plugins
//!
//! ```rust,ignore
//! use munin_runtime::MuninRuntime;
//!
//! let runtime = MuninRuntime::new();
//! runtime.register_plugins(munin_plugins::builtin_plugins())?;
//! ```

pub mod load;
pub mod memory;
pub mod uptime;

use std::fs;
use std::path::Path;

use munin_core::{BoxedPlugin, PluginError, PluginResult};
use tracing::trace;

pub use load::LoadPlugin;
pub use memory::MemoryPlugin;
pub use uptime::UptimePlugin;

/// All built-in plugins, in `list` order.
pub fn builtin_plugins() -> Vec<BoxedPlugin> {
    vec![
        Box::new(UptimePlugin::new()),
        Box::new(LoadPlugin::new()),
        Box::new(MemoryPlugin::new()),
    ]
}

/// Reads a metric source file, mapping any failure to `Unavailable`.
fn read_source(path: &Path) -> PluginResult<String> {
    trace!(path = %path.display(), "Reading metric source");
    fs::read_to_string(path)
        .map_err(|e| PluginError::unavailable(format!("{}: {e}", path.display())))
}
