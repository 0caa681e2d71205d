//! Blackjack server: one table actor behind an axum HTTP/WebSocket front end.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
