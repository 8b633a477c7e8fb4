//! `GitAdapter`: the git2-backed [`super::VcsAdapter`] implementation,
//! grounded on the clone/commit/push pattern used elsewhere in the
//! corpus for agent-driven repository mutation.

use std::path::{Path, PathBuf};

use git2::{Repository, ResetType, Signature};

use super::{CommitSummary, RepoStatus, VcsAdapter, VcsError};

pub struct GitAdapter {
    repo: Repository,
    root: PathBuf,
}

impl GitAdapter {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, VcsError> {
        let root = root.as_ref().to_path_buf();
        let repo = Repository::open(&root)?;
        Ok(Self { repo, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn signature(&self) -> Result<Signature<'static>, VcsError> {
        Signature::now("ada-harness", "ada-harness@localhost").map_err(VcsError::from)
    }
}

impl VcsAdapter for GitAdapter {
    fn status(&self) -> Result<RepoStatus, VcsError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut untracked_paths = Vec::new();
        let mut clean = true;
        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_wt_new() {
                if let Some(path) = entry.path() {
                    untracked_paths.push(path.to_string());
                }
            }
            if !status.is_ignored() {
                clean = false;
            }
        }
        Ok(RepoStatus {
            clean,
            untracked_paths,
        })
    }

    fn head_commit(&self) -> Result<Option<String>, VcsError> {
        match self.repo.head() {
            Ok(head) => Ok(head.target().map(|oid| oid.to_string())),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_all(&self, message: &str) -> Result<String, VcsError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(self.repo.find_commit(
                head.target().ok_or(VcsError::NoHead)?,
            )?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<_> = parent.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        Ok(oid.to_string())
    }

    fn recent_commits(&self, n: usize) -> Result<Vec<CommitSummary>, VcsError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        let mut out = Vec::new();
        for oid in revwalk.take(n) {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            out.push(CommitSummary {
                hash: oid.to_string(),
                message: commit.summary().unwrap_or_default().to_string(),
            });
        }
        Ok(out)
    }

    fn reset(&self, hash: &str, hard: bool) -> Result<(), VcsError> {
        let oid = git2::Oid::from_str(hash)?;
        let object = self.repo.find_object(oid, None)?;
        let kind = if hard {
            ResetType::Hard
        } else {
            ResetType::Mixed
        };
        self.repo.reset(&object, kind, None)?;
        Ok(())
    }

    fn revert(&self, hash: &str) -> Result<(), VcsError> {
        let oid = git2::Oid::from_str(hash)?;
        let commit = self.repo.find_commit(oid)?;
        let mut revert_index = self.repo.revert_commit(&commit, &self.repo.head()?.peel_to_commit()?, 0, None)?;
        let tree_id = revert_index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let head_commit = self.repo.head()?.peel_to_commit()?;
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Revert {hash}"),
            &tree,
            &[&head_commit],
        )?;
        Ok(())
    }
}
