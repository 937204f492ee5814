//! # stemdeck-audio
//!
//! Tick-driven music playback for stemdeck.
//!
//! Features:
//! - Multi-channel music tracks played on a pool of reusable voices
//! - Fade-out before every switch, with the latest request winning
//! - Playlists with end-of-track detection
//! - Headless virtual backend and a cpal software mixer

pub mod backend;
pub mod decode;
pub mod engine;
pub mod events;
pub mod fade;
pub mod mixer;
pub mod output;
pub mod player;
pub mod pool;
pub mod preview;
pub mod resample;
pub mod watcher;

pub use backend::{AudioBackend, VirtualBackend, Voice};
pub use engine::{EngineConfig, FrameTime, PlaybackEngine, PlaybackMode};
pub use events::{ListenerId, TrackFinished, TrackFinishedSubscription};
pub use mixer::MixerBackend;
pub use player::MusicPlayer;
pub use pool::{ChannelHandle, ChannelPool};
pub use preview::{format_time, LivePreview};
