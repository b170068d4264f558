//! Server configuration.

use lobbyhub_lobby::LobbyConfig;

use crate::HubError;

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

/// The only path that accepts upgrades unless configured otherwise.
pub const DEFAULT_PATH: &str = "/ws";

/// Where and how the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request path that accepts WebSocket upgrades. Everything else gets
    /// a 404.
    pub path: String,
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            lobby: LobbyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `PORT`, `HOST` and `LOBBYHUB_PATH` from the environment,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Result<Self, HubError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = port.trim().parse().map_err(|e| {
                HubError::Config(format!("PORT {port:?} is not a valid port: {e}"))
            })?;
        }
        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            config.host = host;
        }
        if let Some(path) = lookup("LOBBYHUB_PATH").filter(|p| !p.is_empty()) {
            if !path.starts_with('/') {
                return Err(HubError::Config(format!(
                    "LOBBYHUB_PATH {path:?} must start with '/'"
                )));
            }
            config.path = path;
        }

        Ok(config)
    }

    /// The `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.path, "/ws");
    }

    #[test]
    fn test_port_from_env() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "8080")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, HubError::Config(_)), "{err:?}");

        let err = ServerConfig::from_lookup(lookup(&[("PORT", "70000")])).unwrap_err();
        assert!(matches!(err, HubError::Config(_)), "{err:?}");
    }

    #[test]
    fn test_host_and_path_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("LOBBYHUB_PATH", "/lobby"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert_eq!(config.path, "/lobby");
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let err =
            ServerConfig::from_lookup(lookup(&[("LOBBYHUB_PATH", "ws")])).unwrap_err();
        assert!(matches!(err, HubError::Config(_)), "{err:?}");
    }
}
