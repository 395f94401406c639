//! Repository adapter built on `git2`.

pub mod client;

pub use client::GitClient;
