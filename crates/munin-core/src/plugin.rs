//! Plugin interface and the ordered plugin registry.
//!
//! A plugin is a named metric source with two capabilities: describe its
//! graph (`config`) and report current values (`fetch`). Both write through a
//! [`PluginOutput`]; plugins have no other way to reach the client.
//!
//! # Example
//!
//! ```rust,ignore
//! use munin_core::{FnPlugin, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(FnPlugin::new(
//!     "volt",
//!     |out| {
//!         out.put_str("graph_title Voltage\nvolt.label V\n");
//!         Ok(())
//!     },
//!     |out| {
//!         out.put_str("volt.value 229\n");
//!         Ok(())
//!     },
//! ))?;
//! ```

use std::fmt;

use crate::accumulator::COMMAND_BUFFER_CAPACITY;
use crate::error::{PluginResult, RegistryError, RegistryResult};
use crate::sink::{PluginOutput, is_printable};

/// Longest plugin name that still fits a `config <name>` command line.
pub const MAX_PLUGIN_NAME_LEN: usize = COMMAND_BUFFER_CAPACITY - "config ".len();

// =============================================================================
// Plugin
// =============================================================================

/// A named metric source.
pub trait Plugin: Send + Sync {
    /// Registry key, matched by exact, case-sensitive equality.
    fn name(&self) -> &str;

    /// Writes the graph configuration block (field declarations).
    fn write_config(&self, out: &mut PluginOutput<'_>) -> PluginResult<()>;

    /// Writes the current metric values.
    fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()>;
}

/// Boxed plugin.
pub type BoxedPlugin = Box<dyn Plugin>;

type Capability = Box<dyn Fn(&mut PluginOutput<'_>) -> PluginResult<()> + Send + Sync>;

/// A plugin assembled from a name and two closures.
pub struct FnPlugin {
    name: String,
    config: Capability,
    values: Capability,
}

impl FnPlugin {
    /// Creates a plugin from its `config` and `values` capabilities.
    pub fn new<C, V>(name: impl Into<String>, config: C, values: V) -> Self
    where
        C: Fn(&mut PluginOutput<'_>) -> PluginResult<()> + Send + Sync + 'static,
        V: Fn(&mut PluginOutput<'_>) -> PluginResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            config: Box::new(config),
            values: Box::new(values),
        }
    }
}

impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_config(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        (self.config)(out)
    }

    fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
        (self.values)(out)
    }
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PluginRegistry
// =============================================================================

/// Ordered collection of plugins, iterated in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<BoxedPlugin>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin.
    ///
    /// Names must be unique, non-empty, printable ASCII without spaces, and at
    /// most [`MAX_PLUGIN_NAME_LEN`] bytes long so that `config <name>` and
    /// `fetch <name>` can address them.
    pub fn register(&mut self, plugin: impl Plugin + 'static) -> RegistryResult<()> {
        self.register_boxed(Box::new(plugin))
    }

    /// Appends an already boxed plugin.
    pub fn register_boxed(&mut self, plugin: BoxedPlugin) -> RegistryResult<()> {
        validate_name(plugin.name())?;
        if self.find(plugin.name()).is_some() {
            return Err(RegistryError::DuplicateName(plugin.name().to_string()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Looks a plugin up by exact name.
    pub fn find(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(AsRef::as_ref)
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.name())
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn validate_name(name: &str) -> RegistryResult<()> {
    if name.is_empty() {
        return Err(RegistryError::invalid_name(name, "name is empty"));
    }
    if name.len() > MAX_PLUGIN_NAME_LEN {
        return Err(RegistryError::invalid_name(
            name,
            "name does not fit in a command line",
        ));
    }
    if !name.bytes().all(|b| is_printable(b) && b != b' ') {
        return Err(RegistryError::invalid_name(
            name,
            "name must be printable ASCII without spaces",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> FnPlugin {
        FnPlugin::new(name, |_| Ok(()), |_| Ok(()))
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut registry = PluginRegistry::new();
        registry.register(noop("temp")).unwrap();
        registry.register(noop("volt")).unwrap();
        registry.register(noop("amps")).unwrap();

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["temp", "volt", "amps"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_find_is_exact_and_case_sensitive() {
        let mut registry = PluginRegistry::new();
        registry.register(noop("volt")).unwrap();

        assert!(registry.find("volt").is_some());
        assert!(registry.find("Volt").is_none());
        assert!(registry.find("vol").is_none());
        assert!(registry.find("volt ").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(noop("volt")).unwrap();
        let err = registry.register(noop("volt")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("volt".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = PluginRegistry::new();
        assert!(registry.register(noop("")).is_err());
        assert!(registry.register(noop("two words")).is_err());
        assert!(registry.register(noop("tab\there")).is_err());
        assert!(registry.register(noop("é")).is_err());

        let longest = "x".repeat(MAX_PLUGIN_NAME_LEN);
        assert!(registry.register(noop(&longest)).is_ok());
        let too_long = "y".repeat(MAX_PLUGIN_NAME_LEN + 1);
        assert!(registry.register(noop(&too_long)).is_err());
    }

    #[test]
    fn test_fn_plugin_capabilities() {
        let plugin = FnPlugin::new(
            "volt",
            |out| {
                out.put_str("graph_title Voltage\n");
                Ok(())
            },
            |out| {
                out.put_str("volt.value 229\n");
                Ok(())
            },
        );

        let mut config = Vec::new();
        plugin.write_config(&mut PluginOutput::new(&mut config)).unwrap();
        assert_eq!(config, b"graph_title Voltage\n");

        let mut values = Vec::new();
        plugin.write_values(&mut PluginOutput::new(&mut values)).unwrap();
        assert_eq!(values, b"volt.value 229\n");
    }
}
