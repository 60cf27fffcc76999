//! # Audio Module
//!
//! Playback core of the jukebox.
//!
//! ### [`controller`] - Playback Controller
//! - Owns a guild's queue, mode flags and voice session
//! - Decides what plays next when a track ends, fails or is skipped
//! - Drops stale signals from replaced tracks and closed sessions
//!
//! ### [`queue`] - Queue
//! - Cyclic pointer over an ordered track list
//! - Shuffle draws without replacement
//!
//! ### [`link`] - Voice Contracts
//! - [`link::VoiceLink`] and [`link::AudioSink`], implemented with songbird in [`player`]
//! - Session signals delivered over a channel
//!
//! ### [`error`] - Error Taxonomy

pub mod controller;
pub mod error;
pub mod link;
pub mod player;
pub mod queue;
