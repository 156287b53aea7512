use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::path::PathBuf;
use std::time::Duration;
use tokio::{fs, time::Instant};
use tracing::{debug, info, warn};

/// Configuración de servidor leída desde JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    #[serde(default)]
    pub prefix: Option<String>,
}

struct CachedSettings {
    settings: Option<GuildSettings>,
    loaded_at: Instant,
}

/// Read-only per-guild settings kept as `<data_dir>/guilds/<guild_id>.json`.
///
/// Lookups are cached for `ttl`, including guilds without a file, so the
/// disk is hit at most once per guild and window.
pub struct GuildSettingsStore {
    guilds_dir: Option<PathBuf>,
    cache: DashMap<GuildId, CachedSettings>,
    ttl: Duration,
}

impl GuildSettingsStore {
    pub fn new(data_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let guilds_dir = data_dir.into().join("guilds");
        info!("📁 Guild settings read from: {}", guilds_dir.display());

        Self {
            guilds_dir: Some(guilds_dir),
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Store that never touches the disk and only knows `settings`.
    pub fn in_memory(settings: impl IntoIterator<Item = GuildSettings>) -> Self {
        let store = Self {
            guilds_dir: None,
            cache: DashMap::new(),
            ttl: Duration::MAX,
        };
        for settings in settings.into_iter().filter(|settings| settings.guild_id != 0) {
            store.cache.insert(
                GuildId::new(settings.guild_id),
                CachedSettings {
                    settings: Some(settings),
                    loaded_at: Instant::now(),
                },
            );
        }
        store
    }

    /// Prefijo personalizado del servidor, si tiene uno
    pub async fn prefix(&self, guild_id: GuildId) -> Option<String> {
        self.get(guild_id)
            .await
            .and_then(|settings| settings.prefix)
            .filter(|prefix| !prefix.trim().is_empty())
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<GuildSettings> {
        if let Some(cached) = self.cache.get(&guild_id) {
            if cached.loaded_at.elapsed() < self.ttl {
                return cached.settings.clone();
            }
        }

        let settings = self.load(guild_id).await;
        self.cache.insert(
            guild_id,
            CachedSettings {
                settings: settings.clone(),
                loaded_at: Instant::now(),
            },
        );
        settings
    }

    async fn load(&self, guild_id: GuildId) -> Option<GuildSettings> {
        let path = self.guilds_dir.as_ref()?.join(format!("{}.json", guild_id));

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file for guild {}", guild_id);
                return None;
            }
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<GuildSettings>(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("Malformed guild settings in {}: {}", path.display(), e);
                None
            }
        }
    }
}
