//! Client-side session core for the game backend
//!
//! Persists the bearer token issued at login (obfuscated, capped at seven
//! days), tracks its expiry, broadcasts authentication changes and keeps
//! per-domain data loaded while a session exists.

pub mod api;
pub mod app;
pub mod auth;
pub mod autoload;
pub mod config;
pub mod storage;
