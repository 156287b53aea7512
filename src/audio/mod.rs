//! # Audio Module
//!
//! Per-guild playback for the bot.
//!
//! ## Architecture
//!
//! ### [`scheduler`] - Playback Scheduler
//! - Queue, bounded history and loop modes for one guild
//! - Reacts to track start/end events from the backend
//! - Skip and back navigation
//!
//! ### [`manager`] - Guild Managers
//! - Lazily created manager per guild
//! - Tracks the channel notices are sent to
//!
//! ### [`backend`] - Audio Backend
//! - The [`backend::AudioBackend`] seam and its event stream
//! - [`songbird_backend`] streams through songbird and yt-dlp
//! - [`ytdlp`] expands playlist URLs into tracks
//! - [`events`] feeds backend events to the schedulers, in order per guild

pub mod backend;
pub mod events;
pub mod manager;
pub mod scheduler;
pub mod songbird_backend;
pub mod track;
pub mod ytdlp;

#[cfg(test)]
pub mod testing;
