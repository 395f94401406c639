//! Error types for the GitWikiSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Wiki(#[from] WikiError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapper(#[from] MapperError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// Wiki errors
// ---------------------------------------------------------------------------

/// Errors from MediaWiki Action API operations.
#[derive(Debug, Error)]
pub enum WikiError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("wiki HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned an error object.
    #[error("wiki API error '{code}': {info}")]
    ApiError {
        code: String,
        info: String,
    },

    /// Bot login was rejected.
    #[error("wiki login failed for user '{username}': {detail}")]
    LoginFailed {
        username: String,
        detail: String,
    },

    /// The configured namespace does not exist on the wiki.
    #[error("unknown wiki namespace '{0}'")]
    UnknownNamespace(String),

    /// The API response did not have the expected shape.
    #[error("wiki response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// Push was rejected (e.g. non-fast-forward).
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected {
        branch: String,
        detail: String,
    },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors from the bidirectional synchronization engine.
///
/// Only failures that abort the whole cycle surface here; per-page wiki
/// write failures are contained and logged inside the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Underlying wiki error during sync.
    #[error("sync wiki error: {0}")]
    WikiError(#[from] WikiError),

    /// Underlying Git error during sync.
    #[error("sync git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation. All are fatal at
/// startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Name mapper errors
// ---------------------------------------------------------------------------

/// Errors from title/path mapping configuration.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The forced extension would make a root page file collide with the
    /// directory marker of its own sub-pages.
    #[error("forced extension '{0}' collides with the directory marker")]
    ExtensionCollidesWithMarker(String),

    /// The forced extension contains characters that break the mapping.
    #[error("invalid forced extension '{ext}': {detail}")]
    InvalidExtension {
        ext: String,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

/// Errors from the identity mapping subsystem.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The mapping file could not be loaded.
    #[error("identity mapping file error at '{path}': {detail}")]
    MappingFileError {
        path: String,
        detail: String,
    },

    /// TOML parse error when reading the mapping file.
    #[error("identity mapping parse error: {0}")]
    ParseError(String),

    /// Generic I/O error.
    #[error("identity I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
