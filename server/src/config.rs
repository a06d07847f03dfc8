//! Runtime settings for the session gateway and the room registry

use crate::rooms::RegistryConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to
    pub bind_addr: String,
    pub max_clients: usize,
    /// Silence after which a connection is torn down
    pub client_timeout: Duration,
    /// How often the timeout checker runs
    pub timeout_check_interval: Duration,
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_clients: 256,
            client_timeout: Duration::from_secs(30),
            timeout_check_interval: Duration::from_secs(1),
            registry: RegistryConfig::default(),
        }
    }
}
