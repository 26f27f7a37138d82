use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_udp_bind() -> SocketAddr {
    "0.0.0.0:9481".parse().unwrap()
}

fn default_client_bind() -> SocketAddr {
    "127.0.0.1:9482".parse().unwrap()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./datastore")
}

fn default_slot_count() -> u64 {
    65_536
}

fn default_ram_cache_keys() -> usize {
    1_024
}

fn default_request_deadline_secs() -> u64 {
    60
}

fn default_swap_interval_secs() -> u64 {
    60
}

/// Top-level node configuration, loaded with `toml::from_str` over a
/// plain config file; every field has a `serde(default)` so a minimal
/// or empty file is valid (§5's Config section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub client_protocol: ClientProtocolConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            link: LinkConfig::default(),
            datastore: DatastoreConfig::default(),
            client_protocol: ClientProtocolConfig::default(),
            routing: RoutingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        toml::from_str(contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_udp_bind")]
    pub bind_address: SocketAddr,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig { bind_address: default_udp_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default = "default_store_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_slot_count")]
    pub chk_slot_count: u64,
    #[serde(default = "default_slot_count")]
    pub ssk_slot_count: u64,
    /// Capacity of the in-memory relay cache each datastore keeps
    /// alongside its persistent `FileStore` (§4.5's "no-cache" zone
    /// aside, a node caches blocks it merely relays for someone else).
    #[serde(default = "default_ram_cache_keys")]
    pub ram_cache_keys: usize,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        DatastoreConfig {
            directory: default_store_dir(),
            chk_slot_count: default_slot_count(),
            ssk_slot_count: default_slot_count(),
            ram_cache_keys: default_ram_cache_keys(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProtocolConfig {
    /// Bound to localhost regardless of this value, per §6.2's policy.
    #[serde(default = "default_client_bind")]
    pub bind_address: SocketAddr,
}

impl Default for ClientProtocolConfig {
    fn default() -> Self {
        ClientProtocolConfig { bind_address: default_client_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Disables the probabilistic HTL coin in favor of a deterministic
    /// decrement, for reproducible tests (§4.5).
    #[serde(default)]
    pub deterministic_htl: bool,
    #[serde(default = "default_swap_interval_secs")]
    pub swap_interval_secs: u64,
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
}

impl RoutingConfig {
    pub fn swap_interval(&self) -> Duration {
        Duration::from_secs(self.swap_interval_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            deterministic_htl: false,
            swap_interval_secs: default_swap_interval_secs(),
            request_deadline_secs: default_request_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive string, e.g. `"node=info,link=debug"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { filter: default_log_filter() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn an_empty_config_file_fills_in_every_default() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.datastore.chk_slot_count, default_slot_count());
        assert_eq!(config.client_protocol.bind_address, default_client_bind());
    }

    #[test]
    fn overriding_one_field_leaves_the_rest_defaulted() {
        let config = Config::from_str("[routing]\ndeterministic_htl = true\n").unwrap();
        assert!(config.routing.deterministic_htl);
        assert_eq!(config.routing.swap_interval_secs, default_swap_interval_secs());
    }
}
