use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Runtime configuration loaded from file, env, and defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Local socket address to bind.
    pub bind: String,
    /// Server `host:port`.
    pub server: String,
    /// Largest datagram the client accepts, in bytes.
    pub max_datagram: usize,
    /// Request retransmission settings.
    pub retry: RetryConfig,
    /// Read cache settings.
    pub cache: CacheConfig,
    /// Relay routing settings.
    pub mixnet: MixnetConfig,
}

/// Request retransmission parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Time to wait for a reply before resending, in milliseconds.
    pub interval_ms: u64,
    /// Sends before giving up, the first one included.
    pub max_attempts: u32,
}

/// Read cache parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Age after which a cached read is revalidated with `lastWrite`, in
    /// seconds.
    pub interval_s: u64,
}

/// Relay routing.
///
/// Requests travel `forward_relays` then the server; replies travel
/// `return_relays` then `reply_to`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MixnetConfig {
    /// Whether requests are wrapped for relays. The server must run with
    /// `--mixnet` to match.
    pub enabled: bool,
    /// Relays on the way to the server, in order.
    pub forward_relays: Vec<String>,
    /// Relays on the way back, in order.
    pub return_relays: Vec<String>,
    /// Address the last return relay delivers to; defaults to `bind`.
    pub reply_to: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { interval_s: 30 }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5005".to_string(),
            server: "127.0.0.1:5006".to_string(),
            max_datagram: 65_507,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            mixnet: MixnetConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind.is_empty() {
            return Err("bind address must not be empty".to_string());
        }
        if self.server.is_empty() {
            return Err("server address must not be empty".to_string());
        }
        if self.max_datagram == 0 {
            return Err("max_datagram must be greater than 0".to_string());
        }
        if self.retry.interval_ms == 0 {
            return Err("retry.interval_ms must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".to_string());
        }
        if self
            .mixnet
            .forward_relays
            .iter()
            .chain(&self.mixnet.return_relays)
            .any(String::is_empty)
        {
            return Err("mixnet relay addresses must not be empty".to_string());
        }
        Ok(())
    }

    /// Time to wait for a reply before resending.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry.interval_ms)
    }

    /// Age after which a cached read is revalidated.
    #[must_use]
    pub fn cache_interval(&self) -> Duration {
        Duration::from_secs(self.cache.interval_s)
    }
}

/// Loads defaults, then `path` if it exists, then `MIXFSC_*` environment
/// variables (`MIXFSC_RETRY__MAX_ATTEMPTS=3` sets `retry.max_attempts`).
///
/// # Errors
///
/// Returns an error if the configuration file cannot be read or parsed.
#[allow(clippy::cast_possible_wrap)]
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    let defaults = ClientConfig::default();
    let mut builder = config::Config::builder()
        .set_default("bind", defaults.bind.as_str())?
        .set_default("server", defaults.server.as_str())?
        .set_default("max_datagram", defaults.max_datagram as i64)?
        .set_default("retry.interval_ms", defaults.retry.interval_ms as i64)?
        .set_default("retry.max_attempts", i64::from(defaults.retry.max_attempts))?
        .set_default("cache.interval_s", defaults.cache.interval_s as i64)?
        .set_default("mixnet.enabled", defaults.mixnet.enabled)?
        .set_default("mixnet.forward_relays", Vec::<String>::new())?
        .set_default("mixnet.return_relays", Vec::<String>::new())?;

    if let Some(config_path) = path {
        if config_path.exists() {
            builder = builder.add_source(config::File::from(config_path));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MIXFSC")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("mixnet.forward_relays")
            .with_list_parse_key("mixnet.return_relays")
            .try_parsing(true),
    );

    let settings = builder.build()?;
    let config: ClientConfig = settings.try_deserialize()?;

    Ok(config)
}
