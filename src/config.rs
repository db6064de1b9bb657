use crate::{
    sources::SourceKind,
    storage::{self, StorageManager},
};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

/// Default per-request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retries after the first attempt
const DEFAULT_MAX_RETRIES: u8 = 1;
/// Default number of web fallback links surfaced
const DEFAULT_FALLBACK_RESULTS: usize = 6;
/// Default delay before a reading position is persisted
const DEFAULT_DEBOUNCE_MS: u64 = 1500;

pub const USER_AGENT_DEFAULT: &str = "lectern/0.1 (public-domain book reader)";

const DEFAULT_ALLOWED_HOSTS: [&str; 9] = [
    "gutendex.com",
    "www.gutenberg.org",
    "gutenberg.org",
    "openlibrary.org",
    "covers.openlibrary.org",
    "archive.org",
    "standardebooks.org",
    "en.wikisource.org",
    "manybooks.net",
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Adapters queried when a search names no sources
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<SourceKind>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
        }
    }
}

fn default_enabled_sources() -> Vec<SourceKind> {
    SourceKind::ALL.to_vec()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Allowlisted relay prefix, e.g. `https://relay.example/api/proxy?url=`.
    /// The absolute target URL is appended percent-encoded.
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Hosts the source adapters may reach
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    #[serde(default = "default_true")]
    pub block_private_ips: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: default_user_agent(),
            relay_url: None,
            allowed_hosts: default_allowed_hosts(),
            block_private_ips: true,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u8 {
    DEFAULT_MAX_RETRIES
}

fn default_user_agent() -> String {
    USER_AGENT_DEFAULT.to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_fallback_results")]
    pub max_results: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: DEFAULT_FALLBACK_RESULTS,
        }
    }
}

fn default_fallback_results() -> usize {
    DEFAULT_FALLBACK_RESULTS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if !(1..=60).contains(&self.http.timeout_secs) {
            bail!(
                "http.timeout_secs must be between 1 and 60, got {}",
                self.http.timeout_secs
            );
        }

        if self.http.user_agent.trim().is_empty() {
            bail!("http.user_agent must not be empty");
        }

        if let Some(relay) = &self.http.relay_url {
            if url::Url::parse(relay).is_err() {
                bail!("http.relay_url is not a valid url: {relay}");
            }
        }

        if !(1..=10).contains(&self.fallback.max_results) {
            bail!(
                "fallback.max_results must be between 1 and 10, got {}",
                self.fallback.max_results
            );
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }
}
