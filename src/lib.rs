//! Core services for a chat-platform media bot
//!
//! Forwards user requests to external AI, image, video, TTS, and web-search
//! APIs and returns text or local artifact paths. The heavy lifting lives in
//! the generic job poller ([`poller`]), the streamed artifact downloader
//! ([`fetch`]), and the bounded LRU caches ([`cache`], [`dedupe`]) that
//! deduplicate repeated requests across services.
//!
//! Platform wiring (command registration, message formatting, event loops)
//! is deliberately not part of this crate; callers reach the core through
//! the plain async functions on [`services::Services`].

pub mod cache;
pub mod config;
pub mod dedupe;
pub mod fetch;
pub mod http;
pub mod poller;
pub mod services;
pub mod utils;
