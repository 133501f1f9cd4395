//! Server configuration

use std::env;

use tracing::warn;

/// Environment variable overriding the listen address
pub const LISTEN_ENV: &str = "PECI_RAW_LISTEN";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5055";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the raw command service binds to
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
        }
    }
}

impl ServerConfig {
    /// Defaults, with `PECI_RAW_LISTEN` applied when it is set
    pub fn from_env() -> Self {
        Self::default().with_listen_override(env::var(LISTEN_ENV).ok())
    }

    fn with_listen_override(mut self, value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            Some("") => warn!("{} is empty, keeping {}", LISTEN_ENV, self.listen_addr),
            Some(addr) => self.listen_addr = addr.to_string(),
            None => {}
        }
        self
    }
}
