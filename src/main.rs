use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod hub;
mod storage;
mod ui;

use crate::audio::{events::BackendEventLoop, manager::MusicManagers, songbird_backend::SongbirdBackend};
use crate::bot::{
    commands::{CommandEnv, CommandRegistry},
    cooldown::CooldownManager,
    gateway::SerenityGateway,
    pending::PendingCommandTable,
    router::CommandRouter,
    MusicBot,
};
use crate::config::Config;
use crate::hub::{dispatcher::HubDispatcher, nats::NatsTransport, OfflineTransport, SyncTransport};
use crate::storage::GuildSettingsStore;

const STATS_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ensemble_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?)
                .add_directive("async_nats=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Ensemble Music v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let shutdown = CancellationToken::new();
    let settings = Arc::new(GuildSettingsStore::new(config.data_dir.clone(), config.prefix_cache_ttl()));

    // Hub de coordinación
    let transport: Arc<dyn SyncTransport> = if config.hub_servers.is_empty() {
        info!("📴 No hub configured, every command runs locally");
        Arc::new(OfflineTransport)
    } else {
        Arc::new(
            NatsTransport::connect(
                &config.hub_servers,
                config.hub_subject_prefix.clone(),
                &config.process_id,
                shutdown.clone(),
            )
            .await?,
        )
    };

    // Audio
    let (events_tx, events_rx) = flume::unbounded();
    let songbird = Songbird::serenity();
    let backend = Arc::new(SongbirdBackend::new(songbird.clone(), events_tx));
    let gateway = Arc::new(SerenityGateway::new());
    let managers = Arc::new(MusicManagers::new(backend.clone(), gateway.clone(), config.default_volume));

    // Comandos
    let registry = Arc::new(CommandRegistry::builtin()?);
    info!("📝 {} commands registered", registry.len());
    let env = CommandEnv {
        managers: managers.clone(),
        backend: backend.clone(),
        gateway: gateway.clone(),
        help: registry.help_entries(),
    };
    let pending = Arc::new(PendingCommandTable::new(config.pending_max_age()));
    let cooldowns = Arc::new(CooldownManager::new());
    let router = Arc::new(CommandRouter::new(
        &config,
        registry,
        env,
        pending.clone(),
        cooldowns,
        transport.clone(),
        settings,
    )?);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(MusicBot::new(router))
        .register_songbird_with(songbird)
        .await?;
    gateway.attach(client.http.clone(), client.cache.clone());

    // Tareas de fondo
    pending.clone().spawn_sweeper(config.pending_sweep_interval(), shutdown.clone());
    BackendEventLoop::new(managers, backend.clone(), gateway).spawn(events_rx, shutdown.clone());
    backend.spawn_stats_reporter(STATS_INTERVAL, shutdown.clone());

    if let Err(e) = HubDispatcher::new(transport, pending, config.process_id.clone()).start().await {
        warn!("⚠️ Hub resolutions unavailable, commands will time out while connected: {}", e);
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal_shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }
    shutdown.cancel();

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
