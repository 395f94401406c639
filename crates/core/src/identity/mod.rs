//! Identity mapping subsystem.
//!
//! Translates wiki usernames into git author identities using a TOML
//! mapping file, with a raw-username fallback for unmapped users.

pub mod mapper;
pub mod mapping_file;

pub use mapper::{GitIdentity, IdentityMapper};
