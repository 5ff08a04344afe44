//! Config validation: every server must be reachable the way its mode says.

use crate::config::{ApplyConfig, Mode, ServerConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &ApplyConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for server in &config.servers {
        validate_server(server)?;
        if !names.insert(server.name.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate server name '{}'", server.name)));
        }
    }
    Ok(())
}

/// Checks one server on its own: a name, and the uri and token its mode needs.
pub fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.name.trim().is_empty() {
        return Err(ConfigError::Validation("every server needs a name".into()));
    }
    match server.mode {
        Mode::NoOp => {}
        m if m.is_sql() => {
            if server.uri.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "server '{}': {} needs a PostgreSQL uri",
                    server.name, server.mode
                )));
            }
        }
        _ => {
            let uri = server.uri.trim();
            if !(uri.starts_with("https://") || uri.starts_with("http://")) {
                return Err(ConfigError::Validation(format!(
                    "server '{}': {} needs an http(s) uri, got '{}'",
                    server.name, server.mode, server.uri
                )));
            }
            if server.client_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "server '{}': {} needs a clientToken",
                    server.name, server.mode
                )));
            }
        }
    }
    Ok(())
}
