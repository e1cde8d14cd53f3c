//! Process uptime in days.

use std::fmt::Write;
use std::time::{Duration, Instant};

use munin_core::{Plugin, PluginOutput, PluginResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Reports how long the node has been running.
#[derive(Debug, Clone, Copy)]
pub struct UptimePlugin {
    started: Instant,
}

impl UptimePlugin {
    /// Starts counting from now.
    pub fn new() -> Self {
        Self::since(Instant::now())
    }

    /// Counts from `started`.
    pub fn since(started: Instant) -> Self {
        Self { started }
    }
}

impl Default for UptimePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for UptimePlugin {
    fn name(&self) -> &str {
        "uptime"
    }

    fn write_config(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        out.put_str(
            "graph_title Uptime\n\
             graph_args --base 1000 -l 0\n\
             graph_vlabel uptime in days\n\
             graph_category system\n\
             uptime.label uptime\n\
             uptime.draw AREA\n",
        );
        Ok(())
    }

    fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        writeln!(out, "uptime.value {:.2}", days(self.started.elapsed()))?;
        Ok(())
    }
}

fn days(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() / SECONDS_PER_DAY
}
