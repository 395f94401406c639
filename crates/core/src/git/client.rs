//! Local Git repository operations via `git2`.
//!
//! [`GitClient`] owns one working copy and exposes exactly the operations
//! the sync engine needs: pull with pending-commit recording, file writes
//! and staging, commits with explicit author timestamps, push with rejection
//! surfacing, and content lookups at historical commits.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{Oid, Repository, Signature, Time};
use tracing::{debug, info, warn};

use crate::errors::GitError;
use crate::identity::GitIdentity;
use crate::models::{FileAtCommit, RepoCommit};

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
    branch: String,
}

impl GitClient {
    /// Open an existing working copy at `repo_path` tracking `branch`.
    pub fn open<P: AsRef<Path>>(repo_path: P, branch: &str) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), branch, "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            branch: branch.to_string(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Committer time of the mainline tip.
    pub fn head_commit_time(&self) -> Result<DateTime<Utc>, GitError> {
        let commit = self.repo.head()?.peel_to_commit()?;
        let secs = commit.committer().when().seconds();
        Ok(DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH))
    }

    /// Fetch from origin and fast-forward the local branch.
    ///
    /// Returns the newly observed commits in parent-to-child order, each
    /// carrying its changed-path list relative to its parent. Commits
    /// created locally are never reported: only history that arrives via
    /// the remote enters the result.
    pub fn pull(&self) -> Result<Vec<RepoCommit>, GitError> {
        let old_head = self.repo.head()?.peel_to_commit()?.id();

        // Empty refspec list: use the remote's configured refspecs so the
        // remote-tracking ref is updated.
        let mut remote = self.repo.find_remote("origin")?;
        remote.fetch(&[] as &[&str], None, None)?;

        let remote_ref = format!("refs/remotes/origin/{}", self.branch);
        let fetch_commit = self
            .repo
            .find_reference(&remote_ref)
            .map_err(|_| GitError::RefNotFound(remote_ref.clone()))?
            .peel_to_commit()?;

        if fetch_commit.id() == old_head {
            return Ok(Vec::new());
        }

        // Fast-forward the local branch to the fetched tip.
        let head_ref = self.repo.head()?;
        if head_ref.is_branch() {
            let head_name = head_ref.name().unwrap_or("HEAD").to_string();
            let mut head_ref_mut = self.repo.find_reference(&head_name)?;
            head_ref_mut.set_target(fetch_commit.id(), "gitwikisync: fast-forward pull")?;
            self.repo.set_head(&head_name)?;
            self.repo
                .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
        }

        // Walk old..new oldest-first so replay order matches history order.
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(fetch_commit.id())?;
        revwalk.hide(old_head)?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(self.describe_commit(&commit)?);
        }

        debug!(count = commits.len(), "recorded pulled commits");
        Ok(commits)
    }

    /// Write file content under the working copy, creating parent
    /// directories as needed. Does not stage.
    pub fn write_file(&self, rel_path: &str, content: &[u8]) -> Result<(), GitError> {
        let abs = self.repo_path.join(rel_path);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&abs, content)?;
        Ok(())
    }

    /// Current working-tree content of a file, or `None` if absent.
    pub fn read_worktree_file(&self, rel_path: &str) -> Result<Option<Vec<u8>>, GitError> {
        match std::fs::read(self.repo_path.join(rel_path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::IoError(e)),
        }
    }

    /// Stage one path.
    pub fn stage(&self, rel_path: &str) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_path(Path::new(rel_path))?;
        index.write()?;
        Ok(())
    }

    /// Remove one path from the index and the working tree.
    pub fn remove(&self, rel_path: &str) -> Result<(), GitError> {
        let abs = self.repo_path.join(rel_path);
        if abs.exists() {
            std::fs::remove_file(&abs)?;
        }
        let mut index = self.repo.index()?;
        index.remove_path(Path::new(rel_path))?;
        index.write()?;
        Ok(())
    }

    /// Commit the staged index with the given author identity and time.
    /// The committer matches the author, including the timestamp.
    pub fn commit(
        &self,
        message: &str,
        identity: &GitIdentity,
        when: DateTime<Utc>,
    ) -> Result<String, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let time = Time::new(when.timestamp(), 0);
        let signature = Signature::new(&identity.name, &identity.email, &time)?;

        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!(sha = %oid, "created commit");
        Ok(oid.to_string())
    }

    /// Push the local branch to origin. Rejections surface as errors.
    pub fn push(&self) -> Result<(), GitError> {
        info!(branch = %self.branch, "pushing");
        let mut remote = self.repo.find_remote("origin")?;

        let push_error = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
        let push_error_clone = push_error.clone();
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                if let Ok(mut slot) = push_error_clone.lock() {
                    *slot = Some(msg.to_string());
                }
            }
            Ok(())
        });
        let mut push_opts = git2::PushOptions::new();
        push_opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{}:refs/heads/{}", self.branch, self.branch);
        remote.push(&[&refspec], Some(&mut push_opts))?;

        let rejected = push_error.lock().map(|mut slot| slot.take()).unwrap_or(None);
        if let Some(detail) = rejected {
            return Err(GitError::PushRejected {
                branch: self.branch.clone(),
                detail,
            });
        }
        debug!("push completed");
        Ok(())
    }

    /// Content of a file as it existed at a specific commit.
    ///
    /// Absence is the deletion signal, not an error.
    pub fn read_file_at_commit(
        &self,
        commit_id: &str,
        rel_path: &str,
    ) -> Result<FileAtCommit, GitError> {
        let oid = Oid::from_str(commit_id)?;
        let commit = self.repo.find_commit(oid)?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(rel_path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                return Ok(FileAtCommit::NotFoundAtCommit)
            }
            Err(e) => return Err(GitError::Git2Error(e)),
        };
        let object = entry.to_object(&self.repo)?;
        let blob = object.peel_to_blob()?;
        Ok(FileAtCommit::Found(blob.content().to_vec()))
    }

    /// Blob paths tracked at the mainline tip.
    pub fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        let tree = self.repo.head()?.peel_to_commit()?.tree()?;
        let mut files = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{root}{name}"));
                }
            }
            git2::TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    fn describe_commit(&self, commit: &git2::Commit) -> Result<RepoCommit, GitError> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut changed_paths = Vec::new();
        for delta in diff.deltas() {
            let path = delta.new_file().path().or_else(|| delta.old_file().path());
            if let Some(p) = path {
                changed_paths.push(p.to_string_lossy().into_owned());
            }
        }

        let secs = commit.committer().when().seconds();
        Ok(RepoCommit {
            id: commit.id().to_string(),
            author: commit.author().name().unwrap_or("").to_string(),
            committer: commit.committer().name().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            timestamp: DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH),
            changed_paths,
        })
    }
}
