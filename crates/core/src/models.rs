//! Domain model types shared by the sync engine, adapters, and daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wiki revisions
// ---------------------------------------------------------------------------

/// What kind of wiki change a revision represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    /// An ordinary page edit.
    Edit,
    /// A synthesized revision carrying the page's current content, produced
    /// on request during a forced resync.
    Resync,
    /// The page was deleted.
    Delete,
    /// The page was moved away.
    Move,
}

impl std::fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Resync => write!(f, "resync"),
            Self::Delete => write!(f, "delete"),
            Self::Move => write!(f, "move"),
        }
    }
}

/// A single pending wiki revision, applied in ascending timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRevision {
    /// Page title without the namespace prefix.
    pub title: String,
    /// Wiki username of the revision's author.
    pub author: String,
    /// Edit summary (may be empty).
    pub comment: String,
    /// Page content; `None` for delete/move events.
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: RevisionKind,
}

// ---------------------------------------------------------------------------
// Repository commits
// ---------------------------------------------------------------------------

/// A repository commit pending reconciliation to the wiki.
///
/// Commits are immutable and processed in parent-to-child order so an older
/// commit's file state never overwrites a newer one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoCommit {
    /// Full hex commit id.
    pub id: String,
    pub author: String,
    pub committer: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Paths changed relative to the parent commit, in diff order.
    pub changed_paths: Vec<String>,
}

/// Result of looking up a file's content at a specific commit.
///
/// Absence is an expected signal meaning "deleted at this commit", never an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAtCommit {
    Found(Vec<u8>),
    NotFoundAtCommit,
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// A path touched on both sides within one sync cycle.
///
/// Resolution is fixed: the wiki version wins, the repository change is
/// discarded, and the page is scheduled for a forced resync next cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    /// Repository path of the discarded change.
    pub path: String,
    /// Wiki page title the path maps to.
    pub title: String,
    /// Commit whose change was discarded.
    pub commit_id: String,
    pub detected_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Create a new conflict record for a discarded repository change.
    pub fn new(path: &str, title: &str, commit_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            title: title.to_string(),
            commit_id: commit_id.to_string(),
            detected_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle statistics
// ---------------------------------------------------------------------------

/// Statistics from a single sync cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub wiki_to_repo_count: usize,
    pub repo_to_wiki_count: usize,
    pub conflicts_detected: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Activity log events
// ---------------------------------------------------------------------------

/// Kind of event recorded on the wiki audit page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Edit,
    Delete,
    Conflict,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Delete => write!(f, "delete"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// One audit row destined for the wiki activity log page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    /// Committer (edits/deletes) or the discarding side's actor (conflicts).
    pub actor: String,
    /// Source commit id.
    pub commit_id: String,
    /// Affected page title.
    pub title: String,
    pub message: String,
    /// New wiki revision id for edits, used for the diff link.
    pub new_rev_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_kind_display() {
        assert_eq!(RevisionKind::Edit.to_string(), "edit");
        assert_eq!(RevisionKind::Resync.to_string(), "resync");
        assert_eq!(RevisionKind::Delete.to_string(), "delete");
        assert_eq!(RevisionKind::Move.to_string(), "move");
    }

    #[test]
    fn test_conflict_record_new() {
        let record = ConflictRecord::new("Foo.lua", "Foo", "abc123");
        assert_eq!(record.path, "Foo.lua");
        assert_eq!(record.title, "Foo");
        assert_eq!(record.commit_id, "abc123");
        assert!(!record.id.is_empty());
    }
}
