//! Relay new image board posts to a Pleroma account.
pub mod config;
pub mod danbooru;
pub mod media;
pub mod pleroma;
pub mod relay;
pub mod state;
