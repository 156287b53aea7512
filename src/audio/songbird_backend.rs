//! Audio backend that streams through songbird, resolving sources with yt-dlp.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use reqwest::Client as HttpClient;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::{context_data::DisconnectReason, CoreEvent},
    input::{AuxMetadata, Compose, YoutubeDl},
    model::CloseCode,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::{AudioBackend, BackendError, BackendEvent, SESSION_INVALID};
use super::track::{EndReason, LoadResult, Track};
use super::ytdlp;

pub const NODE_NAME: &str = "songbird";
const SEARCH_PREFIX: &str = "ytsearch:";

struct ActiveTrack<H> {
    handle: H,
    uuid: Uuid,
    track: Track,
}

/// Which track each guild's player holds. Every change is reported on the
/// event channel, so the slot and the emitted events never disagree.
struct ActiveTracks<H> {
    slots: DashMap<GuildId, ActiveTrack<H>>,
    events: flume::Sender<BackendEvent>,
}

impl<H> ActiveTracks<H> {
    fn new(events: flume::Sender<BackendEvent>) -> Self {
        Self {
            slots: DashMap::new(),
            events,
        }
    }

    /// Records `track` as playing and hands back the handle it replaced.
    fn start(&self, guild_id: GuildId, uuid: Uuid, handle: H, track: Track) -> Option<H> {
        let replaced = self.slots.insert(
            guild_id,
            ActiveTrack {
                handle,
                uuid,
                track: track.clone(),
            },
        );

        let replaced = replaced.map(|old| {
            emit(
                &self.events,
                BackendEvent::TrackEnd {
                    guild_id,
                    track: old.track,
                    reason: EndReason::Replaced,
                },
            );
            old.handle
        });
        emit(&self.events, BackendEvent::TrackStart { guild_id, track });
        replaced
    }

    /// Ends the run identified by `uuid`, unless another track owns the slot by now.
    fn finish(&self, guild_id: GuildId, uuid: Uuid, reason: EndReason) -> bool {
        let Some((_, ended)) = self.slots.remove_if(&guild_id, |_, active| active.uuid == uuid) else {
            return false;
        };

        emit(
            &self.events,
            BackendEvent::TrackEnd {
                guild_id,
                track: ended.track,
                reason,
            },
        );
        true
    }

    fn stop(&self, guild_id: GuildId) -> Option<H> {
        let (_, stopped) = self.slots.remove(&guild_id)?;
        emit(
            &self.events,
            BackendEvent::TrackEnd {
                guild_id,
                track: stopped.track,
                reason: EndReason::Stopped,
            },
        );
        Some(stopped.handle)
    }

    fn track(&self, guild_id: GuildId) -> Option<Track> {
        self.slots.get(&guild_id).map(|active| active.track.clone())
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

pub struct SongbirdBackend {
    songbird: Arc<Songbird>,
    http: HttpClient,
    active: Arc<ActiveTracks<TrackHandle>>,
    watched: DashSet<GuildId>,
    events: flume::Sender<BackendEvent>,
}

impl SongbirdBackend {
    /// Creates the backend and announces it as ready on `events`.
    pub fn new(songbird: Arc<Songbird>, events: flume::Sender<BackendEvent>) -> Self {
        let backend = Self {
            songbird,
            http: HttpClient::new(),
            active: Arc::new(ActiveTracks::new(events.clone())),
            watched: DashSet::new(),
            events,
        };
        emit(
            &backend.events,
            BackendEvent::Ready {
                node: NODE_NAME.to_string(),
            },
        );
        backend
    }

    /// Periodically reports player counts until `shutdown` fires.
    pub fn spawn_stats_reporter(self: Arc<Self>, every: Duration, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        emit(&self.events, BackendEvent::Stats {
                            node: NODE_NAME.to_string(),
                            players: self.watched.len(),
                            playing_players: self.active.len(),
                        });
                    }
                }
            }
        });
    }

    async fn load_playlist(&self, url: &str) -> LoadResult {
        match ytdlp::fetch_playlist(url, ytdlp::PLAYLIST_LIMIT).await {
            Ok(Some((name, tracks))) => {
                info!("📋 Playlist '{}' loaded with {} tracks", name, tracks.len());
                LoadResult::Playlist { name, tracks }
            }
            Ok(None) => LoadResult::NoMatches,
            Err(e) => {
                warn!("❌ Could not load playlist '{}': {:?}", url, e);
                LoadResult::LoadFailed(e.to_string())
            }
        }
    }
}

fn emit(events: &flume::Sender<BackendEvent>, event: BackendEvent) {
    if let Err(e) = events.send(event) {
        warn!("Backend event dropped, receiver gone: {:?}", e.into_inner());
    }
}

fn track_from_metadata(metadata: AuxMetadata, fallback_uri: &str) -> Track {
    let uri = metadata.source_url.unwrap_or_else(|| fallback_uri.to_string());
    let mut track = Track::new(metadata.title.unwrap_or_else(|| uri.clone()), uri);

    if let Some(author) = metadata.artist.or(metadata.channel) {
        track = track.with_author(author);
    }
    if let Some(duration) = metadata.duration {
        track = track.with_duration(duration);
    }
    if let Some(thumbnail) = metadata.thumbnail {
        track = track.with_artwork(thumbnail);
    }
    track
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), BackendError> {
        info!("🔗 Joining voice channel {} in guild {}", channel_id, guild_id);

        let call = self
            .songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| BackendError::Join(e.to_string()))?;

        if self.watched.insert(guild_id) {
            call.lock().await.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectWatcher {
                    guild_id,
                    events: self.events.clone(),
                },
            );
        }

        Ok(())
    }

    async fn load_track(&self, query: &str) -> Result<LoadResult, BackendError> {
        if ytdlp::is_playlist_url(query) {
            return Ok(self.load_playlist(query).await);
        }

        let (mut source, is_search) = match query.strip_prefix(SEARCH_PREFIX) {
            Some(terms) => (YoutubeDl::new_search(self.http.clone(), terms.trim().to_string()), true),
            None => (YoutubeDl::new(self.http.clone(), query.to_string()), false),
        };

        match source.aux_metadata().await {
            Ok(metadata) => Ok(LoadResult::Track(track_from_metadata(metadata, query))),
            Err(e) if is_search => {
                debug!("🔍 No results for '{}': {:?}", query, e);
                Ok(LoadResult::NoMatches)
            }
            Err(e) => {
                warn!("❌ Could not load '{}': {:?}", query, e);
                Ok(LoadResult::LoadFailed(e.to_string()))
            }
        }
    }

    async fn play(&self, guild_id: GuildId, track: Track, volume: f32) -> Result<(), BackendError> {
        let call = self
            .songbird
            .get(guild_id)
            .ok_or(BackendError::NotConnected(guild_id))?;

        let source = YoutubeDl::new(self.http.clone(), track.uri.clone());
        let handle = call.lock().await.play_input(source.into());
        let uuid = handle.uuid();
        let title = track.title.clone();

        // The slot must name this run before any of its own events can fire.
        if let Some(replaced) = self.active.start(guild_id, uuid, handle.clone(), track) {
            if let Err(e) = replaced.stop() {
                debug!("Replaced track already finished: {:?}", e);
            }
        }

        let attached = handle.set_volume(volume).and_then(|_| {
            [TrackEvent::End, TrackEvent::Error].into_iter().try_for_each(|event| {
                handle.add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        guild_id,
                        uuid,
                        active: self.active.clone(),
                    },
                )
            })
        });

        // Ended before we could watch it: report the failure ourselves.
        if let Err(e) = attached {
            error!("❌ Track failed in guild {} before it was watched: {} ({:?})", guild_id, title, e);
            self.active.finish(guild_id, uuid, EndReason::LoadFailed);
        }

        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError> {
        let Some(handle) = self.active.stop(guild_id) else {
            return Ok(());
        };

        handle.stop().map_err(|e| BackendError::Player(e.to_string()))
    }

    fn active_track(&self, guild_id: GuildId) -> Option<Track> {
        self.active.track(guild_id)
    }
}

/// Reports a track's own end, unless it was already replaced or stopped.
struct TrackEndNotifier {
    guild_id: GuildId,
    uuid: Uuid,
    active: Arc<ActiveTracks<TrackHandle>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let errored = match ctx {
            EventContext::Track(states) => states
                .iter()
                .any(|(state, _)| matches!(state.playing, PlayMode::Errored(_))),
            _ => false,
        };

        let reason = if errored {
            EndReason::LoadFailed
        } else {
            EndReason::Finished
        };
        if self.active.finish(self.guild_id, self.uuid, reason) && errored {
            error!("❌ Track failed in guild {}", self.guild_id);
        }

        None
    }
}

/// Forwards voice gateway closures for a guild's call.
struct DisconnectWatcher {
    guild_id: GuildId,
    events: flume::Sender<BackendEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            match data.reason {
                Some(DisconnectReason::WsClosed(Some(CloseCode::SessionInvalid))) => {
                    emit(
                        &self.events,
                        BackendEvent::ConnectionClosed {
                            guild_id: self.guild_id,
                            code: SESSION_INVALID,
                        },
                    );
                }
                _ => {
                    debug!("🔌 Voice driver disconnected in guild {}: {:?}", self.guild_id, data.reason);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_maps_onto_track() {
        let metadata = AuxMetadata {
            title: Some("Song".to_string()),
            artist: Some("Artist".to_string()),
            duration: Some(Duration::from_secs(200)),
            source_url: Some("https://video.test/1".to_string()),
            thumbnail: Some("https://img.test/1.jpg".to_string()),
            ..Default::default()
        };

        let track = track_from_metadata(metadata, "ytsearch:song");

        assert_eq!(track.title, "Song");
        assert_eq!(track.author.as_deref(), Some("Artist"));
        assert_eq!(track.uri, "https://video.test/1");
        assert_eq!(track.duration, Some(Duration::from_secs(200)));
        assert_eq!(track.artwork.as_deref(), Some("https://img.test/1.jpg"));
    }

    #[test]
    fn missing_metadata_falls_back_to_query() {
        let track = track_from_metadata(AuxMetadata::default(), "https://video.test/2");

        assert_eq!(track.uri, "https://video.test/2");
        assert_eq!(track.title, "https://video.test/2");
        assert_eq!(track.author, None);
    }

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn slots() -> (ActiveTracks<&'static str>, flume::Receiver<BackendEvent>) {
        let (tx, rx) = flume::unbounded();
        (ActiveTracks::new(tx), rx)
    }

    #[test]
    fn started_track_is_visible_before_its_end_can_be_reported() {
        let (active, events) = slots();
        let uuid = Uuid::new_v4();

        assert_eq!(active.start(guild(), uuid, "first", Track::new("a", "https://a.test")), None);
        assert_eq!(active.track(guild()), Some(Track::new("a", "https://a.test")));

        // An immediate failure still finds the run and ends it.
        assert!(active.finish(guild(), uuid, EndReason::LoadFailed));
        assert_eq!(active.track(guild()), None);
        assert_eq!(
            events.drain().collect::<Vec<_>>(),
            vec![
                BackendEvent::TrackStart {
                    guild_id: guild(),
                    track: Track::new("a", "https://a.test"),
                },
                BackendEvent::TrackEnd {
                    guild_id: guild(),
                    track: Track::new("a", "https://a.test"),
                    reason: EndReason::LoadFailed,
                },
            ]
        );
    }

    #[test]
    fn replacing_reports_the_old_track_and_ignores_its_late_end() {
        let (active, events) = slots();
        let old = Uuid::new_v4();
        active.start(guild(), old, "first", Track::new("a", "https://a.test"));

        let replaced = active.start(guild(), Uuid::new_v4(), "second", Track::new("b", "https://b.test"));

        assert_eq!(replaced, Some("first"));
        assert!(!active.finish(guild(), old, EndReason::Finished));
        assert_eq!(active.track(guild()), Some(Track::new("b", "https://b.test")));
        assert_eq!(
            events.drain().skip(1).collect::<Vec<_>>(),
            vec![
                BackendEvent::TrackEnd {
                    guild_id: guild(),
                    track: Track::new("a", "https://a.test"),
                    reason: EndReason::Replaced,
                },
                BackendEvent::TrackStart {
                    guild_id: guild(),
                    track: Track::new("b", "https://b.test"),
                },
            ]
        );
    }

    #[test]
    fn stop_clears_the_slot_once() {
        let (active, events) = slots();
        active.start(guild(), Uuid::new_v4(), "first", Track::new("a", "https://a.test"));

        assert_eq!(active.stop(guild()), Some("first"));
        assert_eq!(active.stop(guild()), None);
        assert_eq!(active.len(), 0);
        assert_eq!(events.drain().count(), 2);
    }
}
