//! GitWikiSync core library.
//!
//! This crate provides the foundational components for bidirectional
//! MediaWiki/Git synchronization: configuration, title/path name mapping,
//! identity mapping, the wiki and repository adapters, the on-wiki activity
//! logger, and the sync engine.

pub mod activity;
pub mod config;
pub mod errors;
pub mod git;
pub mod identity;
pub mod mapper;
pub mod models;
pub mod sync_engine;
pub mod wiki;

// Re-exports for convenience.
pub use config::AppConfig;
pub use identity::IdentityMapper;
pub use mapper::NameMapper;
pub use sync_engine::SyncEngine;
