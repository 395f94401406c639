//! On-wiki activity logging.
//!
//! [`ActivityLogger`] appends one audit row per applied edit, deletion, or
//! conflict to the binding's configured log page. Append failures are logged
//! and swallowed: the audit trail must never block synchronization.

use tracing::{debug, warn};

use crate::models::{ActivityEvent, ActivityKind};
use crate::wiki::WikiAdapter;

/// Appends audit rows to a wiki log page.
pub struct ActivityLogger {
    /// Target page; logging is disabled when unset.
    log_page: Option<String>,
    commit_url_base: String,
    repo_name: String,
}

impl ActivityLogger {
    pub fn new(log_page: Option<String>, commit_url_base: &str, repo_name: &str) -> Self {
        Self {
            log_page,
            commit_url_base: commit_url_base.trim_end_matches('/').to_string(),
            repo_name: repo_name.to_string(),
        }
    }

    /// Append one audit row. Failures are reported, never propagated.
    pub async fn record<W: WikiAdapter>(&self, wiki: &W, event: &ActivityEvent) {
        let Some(page) = &self.log_page else {
            return;
        };
        let row = self.format_row(event);
        match wiki.append_page(page, &row, "sync activity").await {
            Ok(()) => debug!(kind = %event.kind, title = %event.title, "activity logged"),
            Err(e) => warn!(error = %e, %page, "failed to append activity log entry"),
        }
    }

    /// One wiki-table row: timestamp, kind, actor, commit link, message,
    /// page link (with a diff link for edits).
    fn format_row(&self, event: &ActivityEvent) -> String {
        let short_id = &event.commit_id[..8.min(event.commit_id.len())];
        let commit_link = format!(
            "[{}/{}/commit/{} {}]",
            self.commit_url_base, self.repo_name, event.commit_id, short_id
        );
        let page_link = match (event.kind, event.new_rev_id) {
            (ActivityKind::Edit, Some(rev_id)) => {
                format!("[[{0}]] ([[Special:Diff/{1}|diff]])", event.title, rev_id)
            }
            _ => format!("[[{}]]", event.title),
        };
        format!(
            "\n|-\n| {} || {} || {} || {} || {} || {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.kind,
            event.actor,
            commit_link,
            event.message,
            page_link,
        )
    }
}
