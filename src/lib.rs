//! Courier: fetches media over BitTorrent and files it into a media library.
//!
//! The download lifecycle lives in [services::downloads]; the HTTP surface in
//! [api] is the adapter a chat front-end talks to.

pub mod api;
pub mod app;
pub mod config;
pub mod services;

pub use app::AppState;
