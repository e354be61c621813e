//! Mock server configuration.
//!
//! Provides listener, credential and protocol parameters. A config can be
//! built in code with the consuming setters or loaded from a JSON file; any
//! field missing from the file keeps its default.

use std::path::Path;
use std::time::Duration;

use mysqlmock_core::error::ConfigError;
use serde::Deserialize;

use crate::auth::AuthPlugin;
use crate::protocol::capabilities::DEFAULT_SERVER_FLAGS;
use crate::protocol::charset::DEFAULT_CHARSET;
use crate::protocol::MAX_PACKET_SIZE;

/// Mock server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (default: 0.0.0.0)
    pub bind_address: String,
    /// Port number (default: 2883)
    pub port: u16,
    /// Version string announced in the greeting
    pub server_version: String,
    /// The single password every user authenticates with
    pub password: String,
    /// Plugin named in the greeting
    pub auth_plugin: AuthPlugin,
    /// Largest accepted frame payload
    pub max_packet_size: usize,
    /// Capability flags advertised in the greeting
    pub capabilities: u32,
    /// Close a connection after this long without input
    #[serde(with = "optional_secs")]
    pub idle_timeout: Option<Duration>,
    /// Character set announced in the greeting and column definitions
    pub charset: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 2883,
            server_version: "5.7.36-mock".to_string(),
            password: "123456".to_string(),
            auth_plugin: AuthPlugin::NativePassword,
            max_packet_size: MAX_PACKET_SIZE,
            capabilities: DEFAULT_SERVER_FLAGS,
            idle_timeout: None,
            charset: DEFAULT_CHARSET,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError {
            message: format!("cannot read config file {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::from_json(&text)
    }

    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError {
            message: format!("invalid config: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Set the bind address.
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the server version string.
    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the plugin named in the greeting.
    pub fn auth_plugin(mut self, plugin: AuthPlugin) -> Self {
        self.auth_plugin = plugin;
        self
    }

    /// Set the max accepted packet size.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Set the advertised capability flags.
    pub fn capabilities(mut self, flags: u32) -> Self {
        self.capabilities = flags;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Get the socket address string to bind.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Check the config before the server starts.
    ///
    /// [`crate::Server::bind`] does not call this, so tests can still bind
    /// port 0 and let the OS choose.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(invalid("bind_address must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port must be non-zero"));
        }
        if self.max_packet_size == 0 || self.max_packet_size > MAX_PACKET_SIZE {
            return Err(invalid(format!(
                "max_packet_size must be between 1 and {MAX_PACKET_SIZE}"
            )));
        }
        if self.server_version.is_empty() {
            return Err(invalid("server_version must not be empty"));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(invalid("idle_timeout must be positive"));
        }
        if self.server_version.contains('\0') {
            return Err(invalid("server_version must not contain NUL"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError {
        message: message.into(),
        source: None,
    }
}

/// `Option<Duration>` as whole seconds in config files.
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
