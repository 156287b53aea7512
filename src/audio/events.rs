use serenity::model::id::GuildId;
use std::{collections::HashMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, BackendEvent, SESSION_INVALID};
use super::manager::MusicManagers;
use crate::bot::gateway::ChatGateway;

/// Routes backend events to the guild schedulers.
///
/// Each guild gets its own worker that handles its events one at a time and
/// in arrival order, so a replaced track's end is always handled before the
/// next track's start. A slow guild (a voice rejoin, a stuck lookup) never
/// holds up the others.
pub struct BackendEventLoop {
    managers: Arc<MusicManagers>,
    backend: Arc<dyn AudioBackend>,
    gateway: Arc<dyn ChatGateway>,
}

impl BackendEventLoop {
    pub fn new(managers: Arc<MusicManagers>, backend: Arc<dyn AudioBackend>, gateway: Arc<dyn ChatGateway>) -> Self {
        Self {
            managers,
            backend,
            gateway,
        }
    }

    pub fn spawn(self, events: flume::Receiver<BackendEvent>, shutdown: CancellationToken) {
        let this = Arc::new(self);
        tokio::spawn(async move {
            let mut workers: HashMap<GuildId, flume::Sender<BackendEvent>> = HashMap::new();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv_async() => match event {
                        Ok(event) => match event.guild_id() {
                            Some(guild_id) => {
                                let worker = workers
                                    .entry(guild_id)
                                    .or_insert_with(|| this.clone().spawn_guild_worker(guild_id, shutdown.clone()));
                                if worker.send(event).is_err() {
                                    warn!("Event worker for guild {} is gone", guild_id);
                                    workers.remove(&guild_id);
                                }
                            }
                            None => this.handle(event).await,
                        },
                        Err(_) => {
                            warn!("Backend event channel closed");
                            break;
                        }
                    }
                }
            }
            debug!("Backend event loop stopped");
        });
    }

    fn spawn_guild_worker(self: Arc<Self>, guild_id: GuildId, shutdown: CancellationToken) -> flume::Sender<BackendEvent> {
        let (tx, rx) = flume::unbounded();
        debug!("Starting event worker for guild {}", guild_id);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv_async() => match event {
                        Ok(event) => self.handle(event).await,
                        Err(_) => break,
                    }
                }
            }
            debug!("Event worker for guild {} stopped", guild_id);
        });

        tx
    }

    pub async fn handle(&self, event: BackendEvent) {
        match event {
            BackendEvent::Ready { node } => {
                info!("✅ Audio backend {} ready", node);
            }
            BackendEvent::Stats {
                node,
                players,
                playing_players,
            } => {
                debug!("📊 {}: {} players, {} playing", node, players, playing_players);
            }
            BackendEvent::TrackStart { guild_id, track } => match self.managers.get(guild_id) {
                Some(manager) => manager.scheduler.on_track_start(track).await,
                None => debug!("Track start for unmanaged guild {}", guild_id),
            },
            BackendEvent::TrackEnd {
                guild_id,
                track,
                reason,
            } => match self.managers.get(guild_id) {
                Some(manager) => manager.scheduler.on_track_end(track, reason).await,
                None => debug!("Track end for unmanaged guild {}", guild_id),
            },
            BackendEvent::ConnectionClosed { guild_id, code } => {
                if code != SESSION_INVALID {
                    debug!("Voice connection closed in guild {} with code {}", guild_id, code);
                    return;
                }

                let Some(channel_id) = self.gateway.self_voice_channel(guild_id) else {
                    warn!("🔌 Voice session invalidated in guild {} but no channel to rejoin", guild_id);
                    return;
                };

                info!("🔄 Voice session invalidated in guild {}, rejoining {}", guild_id, channel_id);
                if let Err(e) = self.backend.connect_voice(guild_id, channel_id).await {
                    error!("Error rejoining voice in guild {}: {:?}", guild_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeBackend;
    use crate::audio::track::{EndReason, Track};
    use crate::bot::testing::RecordingGateway;
    use crate::ui::Notice;
    use serenity::all::ChannelId;
    use std::time::Duration;

    fn setup() -> (BackendEventLoop, Arc<MusicManagers>, FakeBackend, RecordingGateway) {
        let backend = FakeBackend::new();
        let gateway = RecordingGateway::new();
        let managers = Arc::new(MusicManagers::new(
            Arc::new(backend.clone()),
            Arc::new(gateway.clone()),
            0.35,
        ));
        let event_loop = BackendEventLoop::new(managers.clone(), Arc::new(backend.clone()), Arc::new(gateway.clone()));
        (event_loop, managers, backend, gateway)
    }

    #[tokio::test]
    async fn session_invalid_rejoins_current_channel() {
        let (event_loop, _, backend, gateway) = setup();
        gateway.set_self_voice(GuildId::new(1), ChannelId::new(50));

        event_loop
            .handle(BackendEvent::ConnectionClosed {
                guild_id: GuildId::new(1),
                code: SESSION_INVALID,
            })
            .await;

        assert_eq!(backend.joined(), vec![(GuildId::new(1), ChannelId::new(50))]);
    }

    #[tokio::test]
    async fn other_close_codes_are_ignored() {
        let (event_loop, _, backend, gateway) = setup();
        gateway.set_self_voice(GuildId::new(1), ChannelId::new(50));

        event_loop
            .handle(BackendEvent::ConnectionClosed {
                guild_id: GuildId::new(1),
                code: 4014,
            })
            .await;

        assert!(backend.joined().is_empty());
    }

    #[tokio::test]
    async fn track_events_reach_the_guild_scheduler() {
        let (event_loop, managers, _, gateway) = setup();
        let manager = managers.get_or_create(GuildId::new(1), ChannelId::new(10));
        let track = Track::new("a", "https://tracks.test/a");

        event_loop
            .handle(BackendEvent::TrackStart {
                guild_id: GuildId::new(1),
                track: track.clone(),
            })
            .await;

        assert_eq!(manager.scheduler.snapshot().await.current, Some(track.clone()));
        assert_eq!(gateway.notices(), vec![Notice::NowPlaying(track.clone())]);

        event_loop
            .handle(BackendEvent::TrackEnd {
                guild_id: GuildId::new(1),
                track: track.clone(),
                reason: EndReason::Replaced,
            })
            .await;

        let snapshot = manager.scheduler.snapshot().await;
        assert_eq!(snapshot.current, None);
        assert_eq!(snapshot.history, vec![track]);
    }

    #[tokio::test]
    async fn events_for_unknown_guilds_do_not_create_managers() {
        let (event_loop, managers, _, _) = setup();

        event_loop
            .handle(BackendEvent::TrackStart {
                guild_id: GuildId::new(9),
                track: Track::new("a", "https://tracks.test/a"),
            })
            .await;

        assert!(managers.is_empty());
    }

    #[tokio::test]
    async fn spawned_loop_processes_events_in_order() {
        let (event_loop, managers, _, gateway) = setup();
        let manager = managers.get_or_create(GuildId::new(1), ChannelId::new(10));
        let (tx, rx) = flume::unbounded();
        let shutdown = CancellationToken::new();
        event_loop.spawn(rx, shutdown.clone());

        let old = Track::new("old", "https://tracks.test/old");
        let new = Track::new("new", "https://tracks.test/new");
        tx.send(BackendEvent::TrackStart { guild_id: GuildId::new(1), track: old.clone() }).unwrap();
        tx.send(BackendEvent::TrackEnd { guild_id: GuildId::new(1), track: old.clone(), reason: EndReason::Replaced }).unwrap();
        tx.send(BackendEvent::TrackStart { guild_id: GuildId::new(1), track: new.clone() }).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while gateway.notices().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();

        let snapshot = manager.scheduler.snapshot().await;
        assert_eq!(snapshot.current, Some(new));
        assert_eq!(snapshot.history, vec![old]);
    }

    #[tokio::test(start_paused = true)]
    async fn a_slow_rejoin_does_not_hold_up_other_guilds() {
        let (event_loop, managers, backend, gateway) = setup();
        let other = managers.get_or_create(GuildId::new(2), ChannelId::new(20));
        gateway.set_self_voice(GuildId::new(1), ChannelId::new(50));
        backend.set_join_delay(Duration::from_secs(30));
        let (tx, rx) = flume::unbounded();
        let shutdown = CancellationToken::new();
        event_loop.spawn(rx, shutdown.clone());

        let track = Track::new("b", "https://tracks.test/b");
        tx.send(BackendEvent::ConnectionClosed { guild_id: GuildId::new(1), code: SESSION_INVALID }).unwrap();
        tx.send(BackendEvent::TrackStart { guild_id: GuildId::new(2), track: track.clone() }).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while other.scheduler.snapshot().await.current.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(other.scheduler.snapshot().await.current, Some(track));
        assert!(backend.joined().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.joined(), vec![(GuildId::new(1), ChannelId::new(50))]);
        shutdown.cancel();
    }
}
