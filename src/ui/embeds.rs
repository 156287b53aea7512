use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::time::Duration;

use super::notice::{HelpEntry, Notice};
use crate::audio::track::{LoopMode, Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
    pub const GREETING_PINK: Colour = Colour::from_rgb(255, 175, 204);
}

const STANDARD_FOOTER: &str = "🎵 Music comes first, love follows";

/// Renders a notice as the embed sent to Discord.
pub fn render(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying(track) => create_now_playing_embed(track),
        Notice::QueueEmpty => simple(colors::ERROR_RED, "📭 There are no more songs in the queue!"),
        Notice::NoHistory => simple(colors::ERROR_RED, "⏮️ There are no songs left in the history!"),
        Notice::NothingPlaying => simple(colors::NEUTRAL_GRAY, "😴 Nothing is playing right now"),
        Notice::TrackQueued { track, position } => create_track_added_embed(track, *position),
        Notice::PlaylistQueued { name, count } => CreateEmbed::default()
            .title("📋 Playlist Added")
            .description(format!("**{}** songs from **{}** were added to the queue", count, name))
            .color(colors::SUCCESS_GREEN)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        Notice::NoMatches(query) => simple(colors::WARNING_ORANGE, format!("🔍 No results for `{}`", query)),
        Notice::LoadFailed(reason) => simple(colors::ERROR_RED, format!("❌ | Could not load the track: {}", reason)),
        Notice::Removed(track) => simple(colors::INFO_BLUE, format!("🗑️ Removed **{}** from the queue", track.title)),
        Notice::IndexOutOfRange(index) => {
            simple(colors::WARNING_ORANGE, format!("❌ | There is no song at position {}", index))
        }
        Notice::Skipped => simple(colors::MUSIC_PURPLE, "⏭️ Skipped"),
        Notice::WentBack => simple(colors::MUSIC_PURPLE, "⏮️ Playing the previous song"),
        Notice::LoopModeChanged(mode) => {
            simple(colors::MUSIC_PURPLE, format!("{} Loop mode: **{}**", loop_icon(*mode), mode))
        }
        Notice::QueueListing {
            current,
            upcoming,
            total,
            loop_mode,
        } => create_queue_embed(current.as_ref(), upcoming, *total, *loop_mode),
        Notice::Pong => simple(colors::SUCCESS_GREEN, "🏓 Pong!"),
        Notice::Help { prefix, commands } => create_help_embed(prefix, commands),
        Notice::MentionGreeting { prefix } => CreateEmbed::default()
            .description(format!(
                "Hi~ My prefix is `{prefix}`, or just mention me to use a command.\n\
                Use `{prefix}help` to see everything I can do :3"
            ))
            .color(colors::GREETING_PINK)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        Notice::NotInVoice => simple(colors::ERROR_RED, "❌ | You need to be in a voice channel to use this command."),
        Notice::WrongVoiceChannel => simple(
            colors::ERROR_RED,
            "❌ | You need to be in the same voice channel as the bot to use this command.",
        ),
        Notice::MissingBotPermissions(missing) => {
            simple(colors::ERROR_RED, format!("❌ | The bot is missing these permissions: `{}`", missing))
        }
        Notice::MissingUserPermissions(missing) => {
            simple(colors::ERROR_RED, format!("❌ | You are missing these permissions: `{}`", missing))
        }
        Notice::CooldownActive(remaining) => simple(
            colors::WARNING_ORANGE,
            format!("⏳ | Please wait {} before using this command again.", format_remaining(*remaining)),
        ),
        Notice::InvalidArguments { usage } => {
            simple(colors::WARNING_ORANGE, format!("Wrong usage, the correct usage is: `{}`", usage))
        }
        Notice::DispatchTimeout => simple(colors::WARNING_ORANGE, "⏳ | The command took too long, please try again."),
        Notice::NoCapacity => simple(
            colors::WARNING_ORANGE,
            "There is no bot available to play music right now. Please try again later.",
        ),
        Notice::Error(message) => CreateEmbed::default()
            .description(format!("❌ | Something went wrong: \n```\n{}\n```", truncate(message, 2000)))
            .color(colors::ERROR_RED),
    }
}

fn simple(colour: serenity::all::Colour, text: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default().author(CreateEmbedAuthor::new(text)).color(colour)
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new("CONTROL MENU"))
        .description(format!(
            ":notes: **{}**\n\
            :musical_keyboard: **Author:** `{}`\n\
            :hourglass: **Duration:** `{}`",
            track_link(track),
            track.author.as_deref().unwrap_or("Unknown"),
            track.duration.map(format_duration).unwrap_or_else(|| "🔴 Live".to_string()),
        ))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(artwork) = &track.artwork {
        embed = embed.thumbnail(artwork);
    }

    embed
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Added to the queue")
        .description(format!("**{}**", track_link(track)))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Author", track.author.as_deref().unwrap_or("Unknown"), true)
        .field(
            "⏱️ Duration",
            track.duration.map(format_duration).unwrap_or_else(|| "🔴 Live".to_string()),
            true,
        )
        .field("📍 Position", position.to_string(), true);

    if let Some(artwork) = &track.artwork {
        embed = embed.thumbnail(artwork);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(current: Option<&Track>, upcoming: &[Track], total: usize, loop_mode: LoopMode) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if current.is_none() && total == 0 {
        return embed
            .description("😴 **The queue is empty**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    if let Some(current) = current {
        embed = embed.field(
            format!("{} Now playing", loop_icon(loop_mode)),
            format!(
                "**{}**{}",
                current.title,
                current.author.as_ref().map(|a| format!(" - {}", a)).unwrap_or_default()
            ),
            false,
        );
    }

    if !upcoming.is_empty() {
        let mut description = String::new();
        for (i, item) in upcoming.iter().enumerate() {
            let duration = item
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            description.push_str(&format!("**{}**. {}{}\n", i + 1, item.title, duration));
        }
        if total > upcoming.len() {
            description.push_str(&format!("…and {} more", total - upcoming.len()));
        }
        embed = embed.field("Up next", description, false);
    }

    let total_duration: Duration = upcoming.iter().filter_map(|t| t.duration).sum();
    let mut info = format!("**Total:** {} songs • **Loop:** {}", total, loop_mode);
    if total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duration:** {}", format_duration(total_duration)));
    }

    embed
        .field("Info", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str, commands: &[HelpEntry]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Commands")
        .color(colors::INFO_BLUE)
        .description(format!("Prefix: `{}` (or mention me)", prefix));

    let mut categories: Vec<&str> = commands.iter().map(|c| c.category.as_str()).collect();
    categories.dedup();

    for category in categories {
        let lines: Vec<String> = commands
            .iter()
            .filter(|c| c.category == category)
            .map(|c| {
                let aliases = if c.aliases.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", c.aliases.join(", "))
                };
                format!("• `{}`{} - {}", c.name, aliases, c.usage)
            })
            .collect();
        embed = embed.field(category, lines.join("\n"), false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn track_link(track: &Track) -> String {
    if track.uri.starts_with("http") {
        format!("[{}]({})", track.title, track.uri)
    } else {
        track.title.clone()
    }
}

fn loop_icon(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::None => "▶️",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn format_remaining(remaining: Duration) -> String {
    let rounded = Duration::from_secs(remaining.as_secs_f64().ceil() as u64);
    humantime::format_duration(rounded).to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations_with_optional_hours() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn cooldown_remaining_rounds_up_to_whole_seconds() {
        assert_eq!(format_remaining(Duration::from_millis(1200)), "2s");
        assert_eq!(format_remaining(Duration::from_secs(3)), "3s");
    }

    #[test]
    fn only_http_uris_become_links() {
        assert_eq!(track_link(&Track::new("A", "https://x.y/a")), "[A](https://x.y/a)");
        assert_eq!(track_link(&Track::new("B", "ytsearch:b")), "B");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
