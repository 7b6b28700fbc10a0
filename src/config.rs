// ABOUTME: Construction options for a connection, with sensible defaults
// ABOUTME: Builder-style setters so callers can override just the fields they care about

use std::time::Duration;

/// Recognized construction options for a [`crate::Connection`].
///
/// | option     | default        |
/// |------------|----------------|
/// | `hostname` | `127.0.0.1`    |
/// | `port`     | `9042`         |
/// | `timeout`  | `5000ms` (handshake recv) |
/// | `keyspace` | `None`         |
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub timeout: Duration,
    pub keyspace: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 9042,
            timeout: Duration::from_millis(5000),
            keyspace: None,
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub(crate) fn addr(&self) -> (String, u16) {
        (self.hostname.clone(), self.port)
    }
}
