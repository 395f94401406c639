//! Wiki-side adapter interface and its MediaWiki implementation.

pub mod client;

pub use client::MediaWikiClient;

use chrono::{DateTime, Utc};

use crate::errors::WikiError;
use crate::models::PageRevision;

/// Interface to the wiki consumed by the sync engine.
///
/// Each implementation is bound to one namespace and title filter; every
/// method operates on namespace-stripped titles. Read methods have no side
/// effects. `save_page`, `delete_page`, and `append_page` write under the
/// bot identity with the bot flag set.
#[allow(async_fn_in_trait)]
pub trait WikiAdapter {
    /// Revisions newer than `since` for matching pages, ascending by
    /// timestamp. When `force_full` is set, additionally synthesizes one
    /// resync revision per matching page carrying its current content.
    async fn list_pending_revisions(
        &self,
        since: DateTime<Utc>,
        force_full: bool,
    ) -> Result<Vec<PageRevision>, WikiError>;

    /// Synthetic resync revision carrying the page's current content, or
    /// `None` if the page does not exist.
    async fn latest_revision(&self, title: &str) -> Result<Option<PageRevision>, WikiError>;

    /// The most recent delete or move event for a page, or `None`.
    async fn last_delete_or_move(&self, title: &str)
        -> Result<Option<PageRevision>, WikiError>;

    /// Titles of all matching pages.
    async fn list_titles(&self) -> Result<Vec<String>, WikiError>;

    /// Save a page. Returns the new revision id, or `None` for a null edit.
    async fn save_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
    ) -> Result<Option<u64>, WikiError>;

    /// Delete a page with the given reason.
    async fn delete_page(&self, title: &str, reason: &str) -> Result<(), WikiError>;

    /// Append wikitext to a page (used for the activity log).
    async fn append_page(&self, title: &str, text: &str, summary: &str)
        -> Result<(), WikiError>;
}
