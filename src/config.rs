use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub default_prefix: String,

    // Hub
    pub hub_servers: Vec<String>,
    pub hub_subject_prefix: String,
    pub process_id: String,

    // Audio
    pub default_volume: f32,

    // Dispatch
    pub dispatch_timeout_secs: u64,
    pub pending_sweep_interval_secs: u64,
    pub pending_max_age_secs: u64,

    // Paths
    pub data_dir: PathBuf,
    pub prefix_cache_ttl_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            default_prefix: std::env::var("DEFAULT_PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Hub
            hub_servers: std::env::var("HUB_URL")
                .ok()
                .map(|url| parse_servers(&url))
                .unwrap_or_default(),
            hub_subject_prefix: std::env::var("HUB_SUBJECT_PREFIX")
                .unwrap_or_else(|_| "ensemble".to_string()),
            process_id: match std::env::var("PROCESS_ID") {
                Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
                _ => uuid::Uuid::new_v4().to_string(),
            },

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.35".to_string())
                .parse()?,

            // Dispatch
            dispatch_timeout_secs: std::env::var("DISPATCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            pending_sweep_interval_secs: std::env::var("PENDING_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            pending_max_age_secs: std::env::var("PENDING_MAX_AGE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            prefix_cache_ttl_secs: std::env::var("PREFIX_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - The default prefix must be non-empty and contain no whitespace
    /// - Dispatch timeout and sweep interval must be positive
    /// - Pending entries must outlive the dispatch timeout
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.default_prefix.is_empty() || self.default_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Default prefix must be non-empty and without whitespace, got: {:?}", self.default_prefix);
        }

        if self.dispatch_timeout_secs == 0 {
            anyhow::bail!("Dispatch timeout must be greater than 0");
        }

        if self.pending_sweep_interval_secs == 0 {
            anyhow::bail!("Pending sweep interval must be greater than 0");
        }

        if self.pending_max_age_secs < self.dispatch_timeout_secs {
            anyhow::bail!(
                "Pending max age ({}s) must be at least the dispatch timeout ({}s)",
                self.pending_max_age_secs,
                self.dispatch_timeout_secs
            );
        }

        if self.process_id.is_empty() {
            anyhow::bail!("Process id must not be empty");
        }

        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn pending_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_interval_secs)
    }

    pub fn pending_max_age(&self) -> Duration {
        Duration::from_secs(self.pending_max_age_secs)
    }

    pub fn prefix_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.prefix_cache_ttl_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Hub: {} (subjects '{}.*', process {})\n  \
            Audio: {}% vol\n  \
            Dispatch: {}s timeout, sweep every {}s, max age {}s",
            self.default_prefix,
            if self.hub_servers.is_empty() {
                "offline".to_string()
            } else {
                self.hub_servers.join(",")
            },
            self.hub_subject_prefix,
            self.process_id,
            (self.default_volume * 100.0) as u32,
            self.dispatch_timeout_secs,
            self.pending_sweep_interval_secs,
            self.pending_max_age_secs,
        )
    }
}

fn parse_servers(url: &str) -> Vec<String> {
    url.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no token default - must be provided)
            discord_token: String::new(),
            default_prefix: "!".to_string(),

            // Hub defaults: offline
            hub_servers: Vec::new(),
            hub_subject_prefix: "ensemble".to_string(),
            process_id: "local".to_string(),

            default_volume: 0.35,

            dispatch_timeout_secs: 10,
            pending_sweep_interval_secs: 60,
            pending_max_age_secs: 300,

            data_dir: "./data".into(),
            prefix_cache_ttl_secs: 300,
        }
    }
}
