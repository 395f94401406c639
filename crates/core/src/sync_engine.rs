//! Bidirectional wiki <-> repository synchronization engine.
//!
//! The [`SyncEngine`] is the heart of GitWikiSync. Each cycle runs two
//! strictly ordered phases:
//!
//! 1. Wiki -> repository: replay pending wiki revisions (plus delete/move
//!    events for pages gone from the wiki) as commits, oldest first, one
//!    commit and push per revision.
//! 2. Repository -> wiki: re-pull, then drain the pending-commit queue in
//!    parent-to-child order, writing each changed file back to its page
//!    under the bot identity.
//!
//! A path written during phase 1 is protected from phase 2 in the same
//! cycle: the repository change is discarded, recorded as a conflict, and
//! the page is scheduled for a forced resync next cycle. The wiki version
//! always wins.
//!
//! There is no durable cursor. The wiki-side watermark is re-derived every
//! cycle from the mainline tip's commit time, and the pending-commit queue
//! is owned by the engine instance and refilled by pulls.

use std::collections::{HashSet, VecDeque};

use chrono::{Duration, Utc};
use regex_lite::Regex;
use tracing::{debug, error, info, warn};

use crate::activity::ActivityLogger;
use crate::config::{GlobalConfig, RepoBinding};
use crate::errors::{ConfigError, SyncError};
use crate::git::GitClient;
use crate::identity::IdentityMapper;
use crate::mapper::NameMapper;
use crate::models::{
    ActivityEvent, ActivityKind, ConflictRecord, FileAtCommit, PageRevision, RepoCommit,
    RevisionKind, SyncStats,
};
use crate::wiki::WikiAdapter;

/// Commit message used when a wiki edit has no summary.
const EMPTY_SUMMARY_PLACEHOLDER: &str = "*** empty summary ***";

/// Seconds added to the mainline tip's commit time when deriving the
/// wiki-side watermark, so the last synced revision is excluded.
const WATERMARK_SKEW_SECS: i64 = 1;

/// Maximum length of the commit message excerpt in wiki summaries.
const SUMMARY_EXCERPT_LEN: usize = 400;

/// The per-binding synchronization engine.
pub struct SyncEngine<W> {
    name: String,
    wiki: W,
    repo: GitClient,
    mapper: NameMapper,
    identity: IdentityMapper,
    activity: ActivityLogger,
    bot_username: String,
    /// Base for commit links in attribution summaries, e.g.
    /// `https://github.com/wikimedia-bg`.
    commit_url_base: String,
    no_sync: Regex,
    /// Binding ignore list merged with the global one (glob patterns).
    ignores: Vec<String>,
    /// Commits observed by pulls but not yet reconciled to the wiki.
    pending_commits: VecDeque<RepoCommit>,
    /// Pages scheduled for a targeted resync after a conflict. One-shot.
    resync_pages: HashSet<String>,
    /// One-shot full-resync request.
    force_full: bool,
}

impl<W: WikiAdapter> SyncEngine<W> {
    /// Create an engine for one binding.
    pub fn new(
        binding: &RepoBinding,
        global: &GlobalConfig,
        wiki: W,
        repo: GitClient,
        mapper: NameMapper,
        identity: IdentityMapper,
    ) -> Result<Self, ConfigError> {
        let no_sync = Regex::new(&binding.no_sync_pattern).map_err(|e| {
            ConfigError::InvalidValue {
                field: format!("repos.{}.no_sync_pattern", binding.name),
                detail: e.to_string(),
            }
        })?;

        let mut ignores = binding.ignore_list.clone();
        ignores.extend(global.global_ignore_list.iter().cloned());

        let activity = ActivityLogger::new(
            binding.log_page.clone(),
            &global.commit_url_base,
            &binding.name,
        );

        info!(binding = %binding.name, "initializing sync engine");
        Ok(Self {
            name: binding.name.clone(),
            wiki,
            repo,
            mapper,
            identity,
            activity,
            bot_username: global.bot_username.clone(),
            commit_url_base: global.commit_url_base.trim_end_matches('/').to_string(),
            no_sync,
            ignores,
            pending_commits: VecDeque::new(),
            resync_pages: HashSet::new(),
            force_full: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request a full resync: the next cycle treats every matching page as
    /// pending, bypassing the watermark. Consumed by that cycle.
    pub fn request_full_resync(&mut self) {
        self.force_full = true;
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Execute one full sync cycle: wiki -> repository, then repository ->
    /// wiki.
    ///
    /// Per-page wiki write failures are contained and logged; errors that
    /// surface here (pull, commit, push, revision listing) abort the cycle
    /// and the next scheduled cycle retries from re-derived state.
    pub async fn run_cycle(&mut self) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let synced = self.sync_wiki_to_repo(&mut stats).await?;

        // Capture commits made during phase 1 and anything pushed
        // externally in the meantime.
        let pulled = self.repo.pull()?;
        self.enqueue_commits(pulled);

        self.sync_repo_to_wiki(&synced, &mut stats).await?;

        stats.completed_at = Some(Utc::now());
        info!(
            binding = %self.name,
            wiki_to_repo = stats.wiki_to_repo_count,
            repo_to_wiki = stats.repo_to_wiki_count,
            conflicts = stats.conflicts_detected,
            "sync cycle completed"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Phase 1: wiki -> repository
    // -----------------------------------------------------------------------

    /// Replay pending wiki revisions as commits.
    ///
    /// Returns the set of repository paths written from the wiki this
    /// cycle; phase 2 treats changes to these paths as conflicts.
    async fn sync_wiki_to_repo(
        &mut self,
        stats: &mut SyncStats,
    ) -> Result<HashSet<String>, SyncError> {
        let revs = self.pending_revisions().await?;
        let mut synced = HashSet::new();

        for rev in revs {
            // Loop prevention: never replay our own wiki edits. Resync
            // revisions are synthesized on our own request and always pass.
            if rev.kind != RevisionKind::Resync && rev.author == self.bot_username {
                debug!(title = %rev.title, "skipping bot-authored revision");
                continue;
            }

            let identity = self.identity.wiki_to_git(&rev.author);
            let path = self.mapper.title_to_path(&rev.title);

            // Narrow the race window: pick up concurrent repository commits
            // right before applying. They queue for phase 2.
            let pulled = self.repo.pull()?;
            self.enqueue_commits(pulled);

            match rev.kind {
                RevisionKind::Edit | RevisionKind::Resync => {
                    let content = normalize_content(rev.content.as_deref().unwrap_or(""));
                    if rev.kind == RevisionKind::Resync
                        && self.repo.read_worktree_file(&path)?.as_deref()
                            == Some(content.as_bytes())
                    {
                        // Already identical; a commit here would be a no-op.
                        debug!(%path, "resync content unchanged, skipping");
                        continue;
                    }
                    self.repo.write_file(&path, content.as_bytes())?;
                    self.repo.stage(&path)?;
                }
                RevisionKind::Delete | RevisionKind::Move => {
                    self.repo.remove(&path)?;
                }
            }

            let message = if rev.comment.is_empty() {
                EMPTY_SUMMARY_PLACEHOLDER
            } else {
                rev.comment.as_str()
            };
            let sha = self.repo.commit(message, &identity, rev.timestamp)?;
            // Push after each commit. Inefficient, but it keeps the window
            // for conflicting remote pushes as small as possible.
            self.repo.push()?;

            info!(
                binding = %self.name,
                %path,
                kind = %rev.kind,
                sha = %&sha[..8.min(sha.len())],
                "synced wiki revision to repository"
            );
            synced.insert(path);
            stats.wiki_to_repo_count += 1;
        }

        Ok(synced)
    }

    /// Collect everything phase 1 must apply, ascending by timestamp:
    /// pending edit revisions, synthesized resync revisions, and delete/
    /// move events for pages the repository still tracks but the wiki no
    /// longer has.
    async fn pending_revisions(&mut self) -> Result<Vec<PageRevision>, SyncError> {
        // Both resync triggers are one-shot: consumed here even if the
        // cycle later fails.
        let force_full = std::mem::take(&mut self.force_full);
        let resync_pages = std::mem::take(&mut self.resync_pages);

        let since = self.repo.head_commit_time()? + Duration::seconds(WATERMARK_SKEW_SECS);
        let mut revs = self.wiki.list_pending_revisions(since, force_full).await?;

        for title in resync_pages {
            if let Some(rev) = self.wiki.latest_revision(&title).await? {
                revs.push(rev);
            }
        }

        let existing: HashSet<String> = self.wiki.list_titles().await?.into_iter().collect();
        for path in self.repo.tracked_files()? {
            if self.is_ignored(&path) {
                continue;
            }
            let title = self.mapper.path_to_title(&path);
            if existing.contains(&title) {
                continue;
            }
            if let Some(event) = self.wiki.last_delete_or_move(&title).await? {
                revs.push(event);
            }
        }

        // Stable sort: same-timestamp entries keep their input order.
        revs.sort_by_key(|r| r.timestamp);
        Ok(revs)
    }

    // -----------------------------------------------------------------------
    // Phase 2: repository -> wiki
    // -----------------------------------------------------------------------

    /// Drain the pending-commit queue into wiki writes.
    ///
    /// `synced` holds the paths phase 1 exported from the wiki this cycle;
    /// repository changes to those paths are discarded as conflicts.
    async fn sync_repo_to_wiki(
        &mut self,
        synced: &HashSet<String>,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        // Drain only what has been gathered so far; commits that appear
        // later wait for the next cycle.
        let mut remaining = self.pending_commits.len();
        while remaining > 0 {
            remaining -= 1;
            let Some(commit) = self.pending_commits.pop_front() else {
                break;
            };

            if self.no_sync.is_match(&commit.message) {
                info!(id = %commit.id, "ignoring commit flagged do-not-sync");
                continue;
            }

            for path in &commit.changed_paths {
                if self.is_ignored(path) {
                    debug!(%path, "skipping ignored path");
                    continue;
                }
                let title = self.mapper.path_to_title(path);

                if synced.contains(path) {
                    // Same-cycle write on both sides. To be on the safe
                    // side, discard the repository change; the wiki version
                    // was already exported. A resync next cycle settles any
                    // divergence this leaves behind.
                    let conflict = ConflictRecord::new(path, &title, &commit.id);
                    warn!(
                        binding = %self.name,
                        %path,
                        commit = %commit.id,
                        conflict_id = %conflict.id,
                        "conflicting change discarded, wiki version wins"
                    );
                    self.resync_pages.insert(title.clone());
                    stats.conflicts_detected += 1;
                    let event = ActivityEvent {
                        kind: ActivityKind::Conflict,
                        actor: commit.committer.clone(),
                        commit_id: commit.id.clone(),
                        title,
                        message: one_line_excerpt(&commit.message),
                        new_rev_id: None,
                        timestamp: conflict.detected_at,
                    };
                    self.activity.record(&self.wiki, &event).await;
                    continue;
                }

                let summary = self.attribution_summary(&commit);
                match self.repo.read_file_at_commit(&commit.id, path) {
                    Ok(FileAtCommit::Found(bytes)) => {
                        let content = String::from_utf8_lossy(&bytes);
                        let content = content.trim_end_matches('\n');
                        match self.wiki.save_page(&title, content, &summary).await {
                            Ok(new_rev_id) => {
                                info!(binding = %self.name, %title, "saved page");
                                stats.repo_to_wiki_count += 1;
                                let event = ActivityEvent {
                                    kind: ActivityKind::Edit,
                                    actor: commit.committer.clone(),
                                    commit_id: commit.id.clone(),
                                    title,
                                    message: one_line_excerpt(&commit.message),
                                    new_rev_id,
                                    timestamp: Utc::now(),
                                };
                                self.activity.record(&self.wiki, &event).await;
                            }
                            // Contained: move on to the next file. The next
                            // cycle re-detects any divergence this leaves.
                            Err(e) => {
                                error!(binding = %self.name, %title, error = %e, "failed to save page")
                            }
                        }
                    }
                    Ok(FileAtCommit::NotFoundAtCommit) => {
                        match self.wiki.delete_page(&title, &summary).await {
                            Ok(()) => {
                                info!(binding = %self.name, %title, "deleted page");
                                stats.repo_to_wiki_count += 1;
                                let event = ActivityEvent {
                                    kind: ActivityKind::Delete,
                                    actor: commit.committer.clone(),
                                    commit_id: commit.id.clone(),
                                    title,
                                    message: one_line_excerpt(&commit.message),
                                    new_rev_id: None,
                                    timestamp: Utc::now(),
                                };
                                self.activity.record(&self.wiki, &event).await;
                            }
                            Err(e) => {
                                error!(binding = %self.name, %title, error = %e, "failed to delete page")
                            }
                        }
                    }
                    Err(e) => {
                        warn!(%path, commit = %commit.id, error = %e, "unexpected lookup failure")
                    }
                }
            }
            // Commit fully processed (success or failure): it stays off the
            // queue either way.
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enqueue_commits(&mut self, commits: Vec<RepoCommit>) {
        for commit in commits {
            self.pending_commits.push_back(commit);
        }
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignores
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, path))
    }

    /// Wiki edit summary / deletion reason attributing a repository change:
    /// committer link, commit link, one-line message excerpt.
    fn attribution_summary(&self, commit: &RepoCommit) -> String {
        format!(
            "[[User:{user}|{user}]] | {base}/{repo}/commit/{sha} | {message}",
            user = commit.committer,
            base = self.commit_url_base,
            repo = self.name,
            sha = commit.id,
            message = one_line_excerpt(&commit.message),
        )
    }
}

/// Flatten a commit message to one line and cap its length.
fn one_line_excerpt(message: &str) -> String {
    let flat = message.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() > SUMMARY_EXCERPT_LEN {
        let truncated: String = flat.chars().take(SUMMARY_EXCERPT_LEN).collect();
        format!("{truncated}..")
    } else {
        flat.to_string()
    }
}

/// Written file form of wiki page content: exactly one trailing newline.
fn normalize_content(content: &str) -> String {
    format!("{}\n", content.trim_end_matches('\n'))
}
