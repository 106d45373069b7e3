//! Replaydeck - HTTP capture/playback fixture for deterministic tests
//!
//! Sits between a test and a real network dependency. In capture mode it
//! forwards live traffic to a configured base URL and records every exchange
//! to a cassette file; in playback mode it serves recorded responses with
//! realistic timing instead of touching the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::multiple_crate_versions
)]

pub mod capture;
pub mod cassette;
pub mod config;
pub mod error;
pub mod matcher;
pub mod playback;
pub mod request;
pub mod server;

pub use error::{DeckError, Result};
pub use server::Fixture;
