//! API route definitions
//!
//! REST endpoints for the chat front-end: enqueue downloads, pause/resume,
//! and the two-step cancel flows. Status updates are pushed through the
//! configured status sinks, not polled here.

pub mod downloads;
pub mod health;
