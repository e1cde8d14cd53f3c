//! Command parsing and execution.

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::plugin::{Plugin, PluginRegistry};
use crate::sink::PluginOutput;
use crate::transport::Transport;

/// Reply to `version`.
pub const VERSION_LINE: &str = "munin lwIP node version: 0.1\n";

/// Reply to `cap`. No capabilities are advertised.
pub const CAP_LINE: &str = "cap\n";

/// Terminates `nodes`, `config` and `fetch` replies.
pub const END_OF_BLOCK: &str = ".\n";

/// Reply to an unrecognised command.
pub const UNKNOWN_COMMAND_LINE: &str =
    "# unknown command. Try cap, list, nodes, config, fetch, version or quit\n";

/// Reply to `config` or `fetch` without a plugin name.
pub const NO_PLUGIN_LINE: &str = "# no plugin given\n";

/// One complete command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `cap`: advertise capabilities.
    Cap,
    /// `list`: plugin names on one line.
    List,
    /// `nodes`: the node name, then `.`.
    Nodes,
    /// `config <plugin>`: graph configuration block.
    Config(Option<&'a str>),
    /// `fetch <plugin>`: current values block.
    Fetch(Option<&'a str>),
    /// `version`: the version line.
    Version,
    /// `quit`: close the session.
    Quit,
    /// Anything else, as received.
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Classifies a trimmed command line.
    ///
    /// `cap` and `list` ignore anything after a space. `config` and `fetch`
    /// take the rest of the line, leading spaces skipped, as the plugin name.
    /// Matching is case-sensitive.
    pub fn parse(line: &'a str) -> Self {
        if keyword(line, "cap").is_some() {
            return Command::Cap;
        }
        if keyword(line, "list").is_some() {
            return Command::List;
        }
        match line {
            "nodes" => return Command::Nodes,
            "version" => return Command::Version,
            "quit" => return Command::Quit,
            _ => {}
        }
        if let Some(rest) = keyword(line, "config") {
            return Command::Config(plugin_name(rest));
        }
        if let Some(rest) = keyword(line, "fetch") {
            return Command::Fetch(plugin_name(rest));
        }
        Command::Unknown(line)
    }
}

/// Returns what follows `word` when the line is exactly `word` or starts
/// with `word` and a space.
fn keyword<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    (rest.is_empty() || rest.starts_with(' ')).then_some(rest)
}

fn plugin_name(rest: &str) -> Option<&str> {
    let name = rest.trim_start_matches(' ');
    (!name.is_empty()).then_some(name)
}

#[derive(Debug, Clone, Copy)]
enum Capability {
    Config,
    Values,
}

/// Executes `command` against `registry`, writing replies to `conn`.
pub(crate) fn execute<T: Transport>(
    command: Command<'_>,
    node_name: &str,
    registry: &PluginRegistry,
    conn: &mut Connection<T>,
) {
    debug!(?command, "Dispatching command");
    conn.count_command();

    match command {
        Command::Cap => conn.write(CAP_LINE.as_bytes()),
        Command::List => {
            let mut line = registry.names().collect::<Vec<_>>().join(" ");
            line.push('\n');
            conn.write(line.as_bytes());
        }
        Command::Nodes => {
            conn.write(format!("{node_name}\n").as_bytes());
            conn.write_terminator(END_OF_BLOCK.as_bytes());
        }
        Command::Config(Some(name)) => run_plugin(name, Capability::Config, registry, conn),
        Command::Fetch(Some(name)) => run_plugin(name, Capability::Values, registry, conn),
        Command::Config(None) | Command::Fetch(None) => conn.write(NO_PLUGIN_LINE.as_bytes()),
        Command::Version => conn.write(VERSION_LINE.as_bytes()),
        Command::Quit => conn.close(),
        Command::Unknown(_) => conn.write(UNKNOWN_COMMAND_LINE.as_bytes()),
    }
}

fn run_plugin<T: Transport>(
    name: &str,
    capability: Capability,
    registry: &PluginRegistry,
    conn: &mut Connection<T>,
) {
    let Some(plugin) = registry.find(name) else {
        conn.write(format!("# unknown plugin {name}\n").as_bytes());
        return;
    };

    let result = {
        let mut out = PluginOutput::new(conn);
        invoke(plugin, capability, &mut out)
    };
    if let Err(error) = result {
        warn!(plugin = name, ?capability, %error, "Plugin failed");
    }
    conn.finish_line();
    conn.flush_output();
    conn.write_terminator(END_OF_BLOCK.as_bytes());
}

fn invoke(
    plugin: &dyn Plugin,
    capability: Capability,
    out: &mut PluginOutput<'_>,
) -> crate::error::PluginResult<()> {
    match capability {
        Capability::Config => plugin.write_config(out),
        Capability::Values => plugin.write_values(out),
    }
}
