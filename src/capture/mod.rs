//! Capture pipeline: proxy live traffic and record it

mod client;
mod handler;

pub use client::{UpstreamClient, UpstreamResponse};
pub use handler::CaptureHandler;
