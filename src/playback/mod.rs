//! Playback pipeline: serve recorded responses with realistic timing

mod handler;

pub use handler::PlaybackHandler;
