//! Resolver configuration with TOML file loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Serialize [`Duration`] fields as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Tunables for the resolution chain. Every field has a sensible
/// default; a TOML file may override any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Relay registry endpoint. `None` disables registry lookups and
    /// only the static list is probed.
    pub registry_url: Option<String>,
    /// Relays used when the registry is unreachable or empty.
    pub static_relays: Vec<String>,
    /// Netscape-format cookie file. Missing file skips the
    /// credentialed strategy rather than failing.
    pub credential_file: Option<PathBuf>,
    /// Cap on the URL validation probe.
    #[serde(with = "duration_secs")]
    pub validate_timeout: Duration,
    /// Cap on the registry fetch.
    #[serde(with = "duration_secs")]
    pub registry_timeout: Duration,
    /// Cap on a single relay health probe.
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
    /// Cap on the whole relay discovery phase.
    #[serde(with = "duration_secs")]
    pub relay_overall_timeout: Duration,
    /// How many ranked relays the relayed strategy tries.
    pub max_relay_attempts: usize,
    /// Health checking stops early once this many relays are alive.
    pub good_enough_relays: usize,
    /// Concurrent health probe cap.
    pub probe_worker_cap: usize,
    /// First retry delay for transient failures; doubles per retry.
    #[serde(with = "duration_secs")]
    pub backoff_base: Duration,
    /// Retries per strategy for transient failures.
    pub max_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            static_relays: Vec::new(),
            credential_file: default_credential_file(),
            validate_timeout: Duration::from_secs(5),
            registry_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(4),
            relay_overall_timeout: Duration::from_secs(8),
            max_relay_attempts: 2,
            good_enough_relays: 3,
            probe_worker_cap: 10,
            backoff_base: Duration::from_secs(2),
            max_retries: 2,
        }
    }
}

impl ResolverConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Default cookie file under the user config directory, if it exists.
fn default_credential_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("tunegrab").join("cookies.txt");
    path.exists().then_some(path)
}
