//! Playlist expansion through the yt-dlp binary.

use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::track::Track;

/// Maximum number of entries loaded from one playlist.
pub const PLAYLIST_LIMIT: usize = 50;
const DEFAULT_PLAYLIST_NAME: &str = "Playlist";

/// One line of `yt-dlp --flat-playlist --dump-json`.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    playlist_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Whether `query` points at a playlist rather than a single video.
pub fn is_playlist_url(query: &str) -> bool {
    let Ok(url) = Url::parse(query) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    url.path().trim_end_matches('/').ends_with("/playlist") || url.query_pairs().any(|(key, _)| key == "list")
}

/// Turns yt-dlp's line-delimited JSON into a playlist name and its tracks.
///
/// Lines that are not entries (warnings, blanks) are skipped. `None` when
/// nothing playable was listed.
pub fn parse_playlist(stdout: &str) -> Option<(String, Vec<Track>)> {
    let mut name = None;
    let mut tracks = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let entry = match serde_json::from_str::<FlatEntry>(line) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping yt-dlp line: {}", e);
                continue;
            }
        };
        if name.is_none() {
            name = entry.playlist_title.clone();
        }
        if let Some(track) = entry.into_track() {
            tracks.push(track);
        }
    }

    if tracks.is_empty() {
        return None;
    }
    Some((name.unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string()), tracks))
}

impl FlatEntry {
    fn into_track(mut self) -> Option<Track> {
        let uri = self
            .webpage_url
            .or(self.url)
            .or_else(|| self.id.map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;
        let mut track = Track::new(self.title.unwrap_or_else(|| uri.clone()), uri);

        if let Some(author) = self.uploader.or(self.channel) {
            track = track.with_author(author);
        }
        if let Some(seconds) = self.duration.filter(|s| s.is_finite() && *s > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
        if let Some(artwork) = self.thumbnail.or_else(|| self.thumbnails.pop().map(|t| t.url)) {
            track = track.with_artwork(artwork);
        }

        Some(track)
    }
}

/// Lists up to `max_items` entries of the playlist at `url`.
pub async fn fetch_playlist(url: &str, max_items: usize) -> Result<Option<(String, Vec<Track>)>> {
    info!("📋 Obteniendo playlist: {}", url);

    let output = Command::new("yt-dlp")
        .args([
            "--flat-playlist",
            "--dump-json",
            "--playlist-end",
            &max_items.to_string(),
            "--no-warnings",
            url,
        ])
        .output()
        .await
        .context("Error al ejecutar yt-dlp")?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("yt-dlp error: {}", error.trim());
    }

    Ok(parse_playlist(&String::from_utf8_lossy(&output.stdout)))
}
