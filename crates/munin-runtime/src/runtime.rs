//! Runtime orchestration: configuration, logging, plugins and the listener.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use munin_runtime::MuninRuntime;
//!
//! // Auto-loads config from the current directory
//! let runtime = MuninRuntime::new();
//!
//! // Custom configuration path
//! let runtime = MuninRuntime::builder()
//!     .config_file("/etc/munin/munin.toml")
//!     .build()?;
//!
//! runtime.register_plugins(munin_plugins::builtin_plugins())?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, ConfigResult, MuninConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use munin_core::{BoxedPlugin, MuninNode, Plugin, PluginRegistry};
use munin_transport::MuninListener;

/// The Munin node runtime.
///
/// Plugins are registered before the runtime is started; a runtime serves
/// exactly once.
///
/// ```rust,ignore
/// let runtime = MuninRuntime::builder()
///     .profile("production")
///     .set("node.name", "plant-7")
///     .build()?;
/// runtime.register_plugin(my_plugin)?;
/// runtime.run().await?;
/// ```
pub struct MuninRuntime {
    config: MuninConfig,
    /// Taken when the node starts serving.
    registry: Mutex<Option<PluginRegistry>>,
    shutdown: CancellationToken,
}

impl MuninRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to default settings if the configuration cannot be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .with_user_config_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                MuninConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: &MuninConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            node = %config.node.name,
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry: Mutex::new(Some(PluginRegistry::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &MuninConfig {
        &self.config
    }

    /// Registers a plugin unless it is disabled in `plugins.disabled`.
    pub fn register_plugin(&self, plugin: impl Plugin + 'static) -> RuntimeResult<()> {
        self.register_boxed(Box::new(plugin))
    }

    /// Registers several plugins in order.
    pub fn register_plugins<I>(&self, plugins: I) -> RuntimeResult<()>
    where
        I: IntoIterator<Item = BoxedPlugin>,
    {
        plugins
            .into_iter()
            .try_for_each(|plugin| self.register_boxed(plugin))
    }

    fn register_boxed(&self, plugin: BoxedPlugin) -> RuntimeResult<()> {
        if self.config.plugins.is_disabled(plugin.name()) {
            info!(plugin = plugin.name(), "Plugin disabled by configuration");
            return Ok(());
        }

        let mut registry = self.registry.lock();
        let registry = registry.as_mut().ok_or(RuntimeError::AlreadyStarted)?;
        let name = plugin.name().to_string();
        registry.register_boxed(plugin)?;
        debug!(plugin = %name, "Registered plugin");
        Ok(())
    }

    /// Number of plugins registered so far.
    pub fn plugin_count(&self) -> usize {
        self.registry.lock().as_ref().map_or(0, PluginRegistry::len)
    }

    /// Token that stops the node when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> RuntimeResult<MuninListener> {
        let addr = self.config.node.bind_address();
        MuninListener::bind(addr.as_str(), self.config.transport.to_tcp_config())
            .await
            .map_err(|source| RuntimeError::Bind { addr, source })
    }

    /// Serves on an already bound listener until `shutdown` resolves or the
    /// shutdown token is cancelled.
    pub async fn serve_until<F>(&self, listener: MuninListener, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let registry = self
            .registry
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;

        info!(plugins = ?registry, "Starting Munin node");
        let node = MuninNode::new(self.config.to_core_config(), registry);

        let serve = listener.serve(node, self.shutdown.clone());
        tokio::pin!(serve);

        tokio::select! {
            () = &mut serve => {}
            () = shutdown => {
                self.shutdown.cancel();
                serve.await;
            }
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Binds and serves until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Binds and serves until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Munin node is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }
}

impl Default for MuninRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => log_ctrl_c(result),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                log_ctrl_c(signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    log_ctrl_c(signal::ctrl_c().await);
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a `MuninRuntime` with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory, then
    /// `<config_dir>/munin`.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new()
                .with_current_dir()
                .with_user_config_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a whole configuration on top of every other source.
    pub fn merge(mut self, config: MuninConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides a single dotted key, e.g. `node.port`.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> ConfigResult<MuninRuntime> {
        let config = self.config_loader.load()?;
        Ok(MuninRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
