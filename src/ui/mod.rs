//! # UI Module
//!
//! What the bot says and how it looks: [`notice::Notice`] is the full set of
//! user-visible messages, [`embeds`] renders them in the bot's palette.

pub mod embeds;
pub mod notice;

pub use notice::{HelpEntry, Notice};
