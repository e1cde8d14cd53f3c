//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{MuninConfig, NodeConfig, OutputConfig, TransportConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MuninConfig) -> ConfigResult<()> {
    validate_node_config(&config.node)?;
    validate_transport_config(&config.transport)?;
    validate_output_config(&config.output, &config.transport)?;
    Ok(())
}

/// Validates node identity and listen address.
fn validate_node_config(node: &NodeConfig) -> ConfigResult<()> {
    if node.name.is_empty() {
        return Err(ConfigError::validation("Node name must not be empty"));
    }

    // The name goes on the wire verbatim.
    if !node.name.bytes().all(|b| (32..=126).contains(&b)) {
        return Err(ConfigError::validation(format!(
            "Node name must be printable ASCII: {:?}",
            node.name
        )));
    }

    if node.host.is_empty() {
        return Err(ConfigError::validation("Host must not be empty"));
    }

    if node.port == 0 {
        return Err(ConfigError::validation("Port must be greater than 0"));
    }

    Ok(())
}

/// Validates TCP buffer limits.
fn validate_transport_config(transport: &TransportConfig) -> ConfigResult<()> {
    let sizes = [
        ("transport.send_buffer", transport.send_buffer),
        ("transport.queue_limit", transport.queue_limit),
        ("transport.segment_size", transport.segment_size),
        ("transport.receive_window", transport.receive_window),
        ("transport.read_chunk", transport.read_chunk),
    ];
    for (field, value) in sizes {
        if value == 0 {
            return Err(ConfigError::validation(format!(
                "{field} must be greater than 0"
            )));
        }
    }

    if transport.poll_interval_ms == 0 {
        return Err(ConfigError::validation(
            "transport.poll_interval_ms must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates output writer limits against the transport.
fn validate_output_config(output: &OutputConfig, transport: &TransportConfig) -> ConfigResult<()> {
    if output.chunk_size == 0 {
        return Err(ConfigError::validation(
            "output.chunk_size must be greater than 0",
        ));
    }

    // A chunk larger than the send buffer could never be written.
    if output.chunk_size > transport.send_buffer {
        return Err(ConfigError::validation(format!(
            "output.chunk_size ({}) must not exceed transport.send_buffer ({})",
            output.chunk_size, transport.send_buffer
        )));
    }

    if output.pending_limit < output.chunk_size {
        return Err(ConfigError::validation(format!(
            "output.pending_limit ({}) must be at least output.chunk_size ({})",
            output.pending_limit, output.chunk_size
        )));
    }

    Ok(())
}
