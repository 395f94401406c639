//! End-to-end sync engine scenarios.
//!
//! These tests exercise full sync cycles using:
//! - Real local Git repos via `git2` (a bare origin plus working clones)
//! - An in-memory fake wiki adapter
//!
//! No network I/O: pushes go to a local bare repository, and "external"
//! commits are made through a second clone, exactly as a concurrent
//! repository-side writer would.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use gitwikisync_core::config::{GlobalConfig, RepoBinding};
use gitwikisync_core::errors::WikiError;
use gitwikisync_core::git::GitClient;
use gitwikisync_core::identity::{GitIdentity, IdentityMapper};
use gitwikisync_core::mapper::NameMapper;
use gitwikisync_core::models::{PageRevision, RevisionKind};
use gitwikisync_core::sync_engine::SyncEngine;
use gitwikisync_core::wiki::WikiAdapter;

// ===========================================================================
// Fake wiki adapter
// ===========================================================================

#[derive(Default)]
struct FakeWikiInner {
    /// Revisions returned by `list_pending_revisions` (filtered by `since`).
    pending: RefCell<Vec<PageRevision>>,
    /// Titles that currently exist on the wiki.
    titles: RefCell<BTreeSet<String>>,
    /// Current-content resync revisions, by title.
    latest: RefCell<HashMap<String, PageRevision>>,
    /// Delete/move log events, by title.
    log_events: RefCell<HashMap<String, PageRevision>>,
    /// Recorded writes: (title, content, summary).
    saves: RefCell<Vec<(String, String, String)>>,
    /// Recorded deletions: (title, reason).
    deletes: RefCell<Vec<(String, String)>>,
    /// Recorded activity-log appends: (page, row).
    appends: RefCell<Vec<(String, String)>>,
    next_rev_id: Cell<u64>,
}

#[derive(Clone, Default)]
struct FakeWiki {
    inner: Rc<FakeWikiInner>,
}

impl FakeWiki {
    fn add_pending(&self, rev: PageRevision) {
        self.inner.pending.borrow_mut().push(rev);
    }

    fn add_title(&self, title: &str) {
        self.inner.titles.borrow_mut().insert(title.to_string());
    }

    fn set_latest(&self, rev: PageRevision) {
        self.inner
            .latest
            .borrow_mut()
            .insert(rev.title.clone(), rev);
    }

    fn set_log_event(&self, rev: PageRevision) {
        self.inner
            .log_events
            .borrow_mut()
            .insert(rev.title.clone(), rev);
    }

    fn saves(&self) -> Vec<(String, String, String)> {
        self.inner.saves.borrow().clone()
    }

    fn deletes(&self) -> Vec<(String, String)> {
        self.inner.deletes.borrow().clone()
    }

    fn appends(&self) -> Vec<(String, String)> {
        self.inner.appends.borrow().clone()
    }
}

impl WikiAdapter for FakeWiki {
    async fn list_pending_revisions(
        &self,
        since: DateTime<Utc>,
        force_full: bool,
    ) -> Result<Vec<PageRevision>, WikiError> {
        let mut revs: Vec<PageRevision> = self
            .inner
            .pending
            .borrow()
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect();
        if force_full {
            revs.extend(self.inner.latest.borrow().values().cloned());
        }
        revs.sort_by_key(|r| r.timestamp);
        Ok(revs)
    }

    async fn latest_revision(&self, title: &str) -> Result<Option<PageRevision>, WikiError> {
        Ok(self.inner.latest.borrow().get(title).cloned())
    }

    async fn last_delete_or_move(
        &self,
        title: &str,
    ) -> Result<Option<PageRevision>, WikiError> {
        Ok(self.inner.log_events.borrow().get(title).cloned())
    }

    async fn list_titles(&self) -> Result<Vec<String>, WikiError> {
        Ok(self.inner.titles.borrow().iter().cloned().collect())
    }

    async fn save_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
    ) -> Result<Option<u64>, WikiError> {
        self.inner.saves.borrow_mut().push((
            title.to_string(),
            content.to_string(),
            summary.to_string(),
        ));
        self.inner.titles.borrow_mut().insert(title.to_string());
        let id = self.inner.next_rev_id.get() + 1;
        self.inner.next_rev_id.set(id);
        Ok(Some(id))
    }

    async fn delete_page(&self, title: &str, reason: &str) -> Result<(), WikiError> {
        self.inner
            .deletes
            .borrow_mut()
            .push((title.to_string(), reason.to_string()));
        self.inner.titles.borrow_mut().remove(title);
        Ok(())
    }

    async fn append_page(
        &self,
        title: &str,
        text: &str,
        _summary: &str,
    ) -> Result<(), WikiError> {
        self.inner
            .appends
            .borrow_mut()
            .push((title.to_string(), text.to_string()));
        Ok(())
    }
}

// ===========================================================================
// Fixtures
// ===========================================================================

fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

fn bot_identity() -> GitIdentity {
    GitIdentity {
        name: "SyncBot".into(),
        email: "sync@example.com".into(),
    }
}

fn edit(title: &str, content: &str, comment: &str, author: &str, ts: DateTime<Utc>) -> PageRevision {
    PageRevision {
        title: title.to_string(),
        author: author.to_string(),
        comment: comment.to_string(),
        content: Some(content.to_string()),
        timestamp: ts,
        kind: RevisionKind::Edit,
    }
}

fn resync(title: &str, content: &str, ts: DateTime<Utc>) -> PageRevision {
    PageRevision {
        title: title.to_string(),
        author: "External Dev".to_string(),
        comment: "forced resync from wiki".to_string(),
        content: Some(content.to_string()),
        timestamp: ts,
        kind: RevisionKind::Resync,
    }
}

/// Create a bare origin and a working clone seeded with `seed_files`,
/// committed and pushed at 2024-01-01 00:00.
fn setup_repo(tmp: &Path, seed_files: &[(&str, &str)]) -> (GitClient, PathBuf, PathBuf) {
    let bare_dir = tmp.join("origin.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.bare(true);
    opts.initial_head("master");
    git2::Repository::init_opts(&bare_dir, &opts).unwrap();

    let work_dir = tmp.join("work");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = git2::Repository::init_opts(&work_dir, &opts).unwrap();
    repo.remote("origin", bare_dir.to_str().unwrap()).unwrap();

    let client = GitClient::open(&work_dir, "master").unwrap();
    for (path, content) in seed_files {
        client.write_file(path, content.as_bytes()).unwrap();
        client.stage(path).unwrap();
    }
    client.commit("seed", &bot_identity(), t(0, 0)).unwrap();
    client.push().unwrap();
    (client, work_dir, bare_dir)
}

/// Commit and push through a second clone, as an external repository-side
/// writer would. `None` content means the path is removed.
fn external_commit(
    tmp: &Path,
    bare_dir: &Path,
    clone_name: &str,
    files: &[(&str, Option<&str>)],
    message: &str,
    ts: DateTime<Utc>,
) -> String {
    let ext_dir = tmp.join(clone_name);
    git2::Repository::clone(bare_dir.to_str().unwrap(), &ext_dir).unwrap();
    let client = GitClient::open(&ext_dir, "master").unwrap();
    for (path, content) in files {
        match content {
            Some(c) => {
                client.write_file(path, c.as_bytes()).unwrap();
                client.stage(path).unwrap();
            }
            None => client.remove(path).unwrap(),
        }
    }
    let identity = GitIdentity {
        name: "External Dev".into(),
        email: "dev@example.com".into(),
    };
    let sha = client.commit(message, &identity, ts).unwrap();
    client.push().unwrap();
    sha
}

fn test_global(root: &Path) -> GlobalConfig {
    GlobalConfig {
        api_url: "https://wiki.example.org/w/api.php".into(),
        bot_username: "SyncBot".into(),
        bot_password_env: "WIKI_BOT_PASSWORD".into(),
        repositories_root: root.to_path_buf(),
        sleep_seconds: 60,
        commit_url_base: "https://github.com/example".into(),
        global_ignore_list: vec!["README.md".into(), ".gitignore".into()],
        identity_file: None,
        log_level: "info".into(),
        bot_password: None,
    }
}

fn test_binding() -> RepoBinding {
    RepoBinding {
        name: "lua".into(),
        local_path: None,
        namespace: "Module".into(),
        title_pattern: ".*".into(),
        title_nocase: false,
        force_extension: Some("lua".into()),
        ignore_list: Vec::new(),
        no_sync_pattern: r"\bDO\s+NOT\s+(MERGE|SYNC)\b".into(),
        log_page: Some("Project:Sync log".into()),
        branch: "master".into(),
    }
}

fn build_engine(wiki: FakeWiki, repo: GitClient, root: &Path) -> SyncEngine<FakeWiki> {
    let binding = test_binding();
    let global = test_global(root);
    let mapper = NameMapper::new(binding.force_extension.as_deref()).unwrap();
    let identity = IdentityMapper::new(None).unwrap();
    SyncEngine::new(&binding, &global, wiki, repo, mapper, identity).unwrap()
}

/// Newest-first commit messages from the working clone.
fn head_messages(work_dir: &Path, n: usize) -> Vec<String> {
    let repo = git2::Repository::open(work_dir).unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.take(n)
        .map(|oid| {
            repo.find_commit(oid.unwrap())
                .unwrap()
                .message()
                .unwrap()
                .to_string()
        })
        .collect()
}

fn head_sha(work_dir: &Path) -> String {
    let repo = git2::Repository::open(work_dir).unwrap();
    let sha = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();
    sha
}

fn read_work_file(work_dir: &Path, rel: &str) -> Option<String> {
    std::fs::read_to_string(work_dir.join(rel)).ok()
}

// ===========================================================================
// Phase 1: wiki -> repository
// ===========================================================================

#[tokio::test]
async fn revisions_apply_in_timestamp_order() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[]);

    let wiki = FakeWiki::default();
    // Deliberately scrambled input order.
    wiki.add_pending(edit("Three", "3", "third", "alice", t(3, 0)));
    wiki.add_pending(edit("One", "1", "first", "alice", t(1, 0)));
    wiki.add_pending(edit("Two", "2", "second", "alice", t(2, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 3);
    assert_eq!(
        head_messages(&work_dir, 3),
        vec!["third".to_string(), "second".to_string(), "first".to_string()]
    );
}

#[tokio::test]
async fn bot_edits_are_never_committed() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[]);
    let before = head_sha(&work_dir);

    let wiki = FakeWiki::default();
    wiki.add_pending(edit("Echo", "looped", "sync echo", "SyncBot", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 0);
    assert_eq!(head_sha(&work_dir), before);
    assert!(read_work_file(&work_dir, "Echo.lua").is_none());
}

#[tokio::test]
async fn noop_resync_produces_no_commit() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[("A.lua", "x\n")]);
    let before = head_sha(&work_dir);

    let wiki = FakeWiki::default();
    wiki.add_title("A");
    wiki.set_latest(resync("A", "x", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    engine.request_full_resync();
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 0);
    assert_eq!(head_sha(&work_dir), before);
}

#[tokio::test]
async fn changed_resync_is_committed() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[("A.lua", "old\n")]);

    let wiki = FakeWiki::default();
    wiki.add_title("A");
    wiki.set_latest(resync("A", "new", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    engine.request_full_resync();
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 1);
    assert_eq!(read_work_file(&work_dir, "A.lua").as_deref(), Some("new\n"));
    assert_eq!(head_messages(&work_dir, 1), vec!["forced resync from wiki"]);

    // The flag is one-shot: a second cycle does nothing.
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.wiki_to_repo_count, 0);
}

#[tokio::test]
async fn empty_summary_gets_placeholder() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[]);

    let wiki = FakeWiki::default();
    wiki.add_pending(edit("Quiet", "content", "", "alice", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    engine.run_cycle().await.unwrap();

    assert_eq!(head_messages(&work_dir, 1), vec!["*** empty summary ***"]);
}

#[tokio::test]
async fn subpages_do_not_collide_with_parent_pages() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[]);

    let wiki = FakeWiki::default();
    wiki.add_pending(edit("Foo", "parent", "add parent", "alice", t(1, 0)));
    wiki.add_pending(edit("Foo/Bar", "child", "add child", "alice", t(2, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 2);
    assert_eq!(
        read_work_file(&work_dir, "Foo.lua").as_deref(),
        Some("parent\n")
    );
    assert_eq!(
        read_work_file(&work_dir, "Foo.d/Bar").as_deref(),
        Some("child\n")
    );
}

#[tokio::test]
async fn missing_page_delete_event_removes_file() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, _bare) = setup_repo(tmp.path(), &[("Gone.lua", "bye\n")]);

    let wiki = FakeWiki::default();
    // The page no longer exists on the wiki; only its deletion log entry.
    wiki.set_log_event(PageRevision {
        title: "Gone".into(),
        author: "admin".into(),
        comment: "spam".into(),
        content: None,
        timestamp: t(1, 0),
        kind: RevisionKind::Delete,
    });

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 1);
    assert!(read_work_file(&work_dir, "Gone.lua").is_none());
    assert_eq!(head_messages(&work_dir, 1), vec!["spam"]);
}

// ===========================================================================
// Phase 2: repository -> wiki
// ===========================================================================

#[tokio::test]
async fn external_edit_saves_page_and_logs_activity() {
    let tmp = TempDir::new().unwrap();
    let (repo, _work_dir, bare_dir) = setup_repo(tmp.path(), &[("Seed.lua", "seed\n")]);

    let sha = external_commit(
        tmp.path(),
        &bare_dir,
        "ext",
        &[("D.lua", Some("hello\n")), ("README.md", Some("docs\n"))],
        "add D",
        t(1, 0),
    );

    let wiki = FakeWiki::default();
    wiki.add_title("Seed");

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    // README.md is globally ignored; only the page file is exported.
    assert_eq!(stats.repo_to_wiki_count, 1);
    let saves = wiki.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].0, "D");
    assert_eq!(saves[0].1, "hello");
    assert!(saves[0].2.contains("[[User:External Dev|External Dev]]"));
    assert!(saves[0].2.contains(&format!(
        "https://github.com/example/lua/commit/{sha}"
    )));
    assert!(saves[0].2.contains("add D"));

    let appends = wiki.appends();
    assert_eq!(appends.len(), 1);
    assert_eq!(appends[0].0, "Project:Sync log");
    assert!(appends[0].1.contains("add D"));
    assert!(appends[0].1.contains("Special:Diff"));
}

#[tokio::test]
async fn deleted_file_deletes_wiki_page() {
    let tmp = TempDir::new().unwrap();
    let (repo, _work_dir, bare_dir) = setup_repo(tmp.path(), &[("B.lua", "content\n")]);

    let sha = external_commit(
        tmp.path(),
        &bare_dir,
        "ext",
        &[("B.lua", None)],
        "remove B",
        t(1, 0),
    );

    let wiki = FakeWiki::default();
    wiki.add_title("B");

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.repo_to_wiki_count, 1);
    assert!(wiki.saves().is_empty());
    let deletes = wiki.deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, "B");
    assert!(deletes[0].1.contains(&sha));
    assert!(deletes[0].1.contains("remove B"));
}

#[tokio::test]
async fn do_not_sync_commits_never_reach_the_wiki() {
    let tmp = TempDir::new().unwrap();
    let (repo, _work_dir, bare_dir) = setup_repo(tmp.path(), &[]);

    external_commit(
        tmp.path(),
        &bare_dir,
        "ext",
        &[("C.lua", Some("secret\n"))],
        "DO NOT SYNC: staging experiment",
        t(1, 0),
    );

    let wiki = FakeWiki::default();
    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.repo_to_wiki_count, 0);
    assert!(wiki.saves().is_empty());

    // Dropped for good, not deferred: the next cycle stays quiet too.
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.repo_to_wiki_count, 0);
    assert!(wiki.saves().is_empty());
}

#[tokio::test]
async fn ordered_commits_apply_parent_to_child() {
    let tmp = TempDir::new().unwrap();
    let (repo, _work_dir, bare_dir) = setup_repo(tmp.path(), &[]);

    // Two commits through the same clone: the second overwrites the first.
    let ext_dir = tmp.path().join("ext");
    git2::Repository::clone(bare_dir.to_str().unwrap(), &ext_dir).unwrap();
    let ext = GitClient::open(&ext_dir, "master").unwrap();
    let identity = GitIdentity {
        name: "External Dev".into(),
        email: "dev@example.com".into(),
    };
    ext.write_file("E.lua", b"v1\n").unwrap();
    ext.stage("E.lua").unwrap();
    ext.commit("v1", &identity, t(1, 0)).unwrap();
    ext.write_file("E.lua", b"v2\n").unwrap();
    ext.stage("E.lua").unwrap();
    ext.commit("v2", &identity, t(2, 0)).unwrap();
    ext.push().unwrap();

    let wiki = FakeWiki::default();
    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    engine.run_cycle().await.unwrap();

    // Both commits replay, oldest first, so the final page state is v2.
    let saves = wiki.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[0].1, "v1");
    assert_eq!(saves[1].1, "v2");
}

// ===========================================================================
// Conflicts
// ===========================================================================

#[tokio::test]
async fn same_cycle_conflict_prefers_wiki_and_schedules_resync() {
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, bare_dir) = setup_repo(tmp.path(), &[("A.lua", "old\n")]);

    // An unrelated repository-side change to the same file...
    external_commit(
        tmp.path(),
        &bare_dir,
        "ext",
        &[("A.lua", Some("external\n"))],
        "external change",
        t(0, 30),
    );

    // ...while the wiki edits page A in the same cycle.
    let wiki = FakeWiki::default();
    wiki.add_title("A");
    wiki.add_pending(edit("A", "from wiki", "wiki edit", "alice", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    // The wiki version won: the repository change was discarded and logged.
    assert_eq!(stats.conflicts_detected, 1);
    assert!(wiki.saves().is_empty());
    assert_eq!(
        read_work_file(&work_dir, "A.lua").as_deref(),
        Some("from wiki\n")
    );
    let appends = wiki.appends();
    assert_eq!(appends.len(), 1);
    assert!(appends[0].1.contains("conflict"));

    // Next cycle re-exports the wiki's current content of A.
    wiki.set_latest(resync("A", "from wiki v2", t(2, 0)));
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.wiki_to_repo_count, 1);
    assert_eq!(stats.conflicts_detected, 0);
    assert_eq!(
        read_work_file(&work_dir, "A.lua").as_deref(),
        Some("from wiki v2\n")
    );
}

// ===========================================================================
// Full scenario
// ===========================================================================

#[tokio::test]
async fn wiki_edit_round_trip_does_not_echo() {
    // File "A.lua" (forced extension "lua") exists; wiki page "A" is edited
    // to "x". Phase 1 must write "A.lua" = "x\n", commit with the edit's
    // comment, and push; phase 2 must not re-export it in the same cycle.
    let tmp = TempDir::new().unwrap();
    let (repo, work_dir, bare_dir) = setup_repo(tmp.path(), &[("A.lua", "old\n")]);

    let wiki = FakeWiki::default();
    wiki.add_title("A");
    wiki.add_pending(edit("A", "x", "tweak A", "alice", t(1, 0)));

    let mut engine = build_engine(wiki.clone(), repo, tmp.path());
    let stats = engine.run_cycle().await.unwrap();

    assert_eq!(stats.wiki_to_repo_count, 1);
    assert_eq!(stats.repo_to_wiki_count, 0);
    assert_eq!(stats.conflicts_detected, 0);
    assert_eq!(read_work_file(&work_dir, "A.lua").as_deref(), Some("x\n"));
    assert_eq!(head_messages(&work_dir, 1), vec!["tweak A"]);
    assert!(wiki.saves().is_empty());

    // The commit was pushed: origin's tip matches the working clone.
    let bare = git2::Repository::open(&bare_dir).unwrap();
    let bare_tip = bare
        .find_reference("refs/heads/master")
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .id()
        .to_string();
    assert_eq!(bare_tip, head_sha(&work_dir));

    // A second cycle with no new input stays idle.
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.wiki_to_repo_count, 0);
    assert_eq!(stats.repo_to_wiki_count, 0);
}
