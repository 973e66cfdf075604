use crate::error::GitError;
use git2::{BranchType, ErrorCode, Oid, Repository, Sort};
use std::path::{Path, PathBuf};

/// Metadata of one commit as read from the object database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    /// Full commit SHA hash (40 characters)
    pub hash: String,
    /// Commit message (first line and body)
    pub message: String,
    /// Author's name
    pub author_name: String,
    /// Author's email address
    pub author_email: String,
    /// Author timestamp (Unix epoch seconds)
    pub author_time: i64,
    /// SHA hashes of parent commits, first parent first
    pub parent_hashes: Vec<String>,
}

/// Repository-level identity from git config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Explicit early-termination signal for history walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// Bounds applied to an ancestry walk
#[derive(Debug, Clone, Default)]
pub struct WalkBounds {
    /// Exclusive stop point: this commit and its ancestors are not visited
    pub stop: Option<String>,
    /// Additional tips whose ancestors are excluded (e.g. the default branch head)
    pub hide: Vec<String>,
    /// Stop once a commit's author time precedes this Unix timestamp
    pub since: Option<i64>,
}

/// Git repository walker for extracting commit information
pub struct GitWalker {
    repo: Repository,
    repo_path: PathBuf,
}

fn parse_oid(hash: &str) -> Result<Oid, GitError> {
    Oid::from_str(hash).map_err(|e| GitError::UnreadableObject {
        oid: hash.to_string(),
        reason: e.message().to_string(),
    })
}

impl GitWalker {
    /// Discover and open a git repository from any path within it
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                GitError::RepoNotFound(path.display().to_string())
            } else {
                GitError::OpenFailed(format!("{}: {}", path.display(), e.message()))
            }
        })?;
        Self::from_repository(repo)
    }

    /// Open the repository rooted exactly at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                GitError::RepoNotFound(path.display().to_string())
            } else {
                GitError::OpenFailed(format!("{}: {}", path.display(), e.message()))
            }
        })?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: Repository) -> Result<Self, GitError> {
        let repo_path = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.path().to_path_buf());
        tracing::info!("Opened git repository at: {}", repo_path.display());
        Ok(Self { repo, repo_path })
    }

    /// Get the repository root path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Get the current branch name, or None if detached HEAD
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(|s| s.to_string())
    }

    /// Local branch names, sorted
    pub fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let branches = self
            .repo
            .branches(Some(BranchType::Local))
            .map_err(|e| GitError::OpenFailed(format!("listing branches: {}", e.message())))?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch
                .map_err(|e| GitError::OpenFailed(format!("reading branch: {}", e.message())))?;
            match branch.name() {
                Ok(Some(name)) => names.push(name.to_string()),
                _ => tracing::debug!("Skipping branch with non-UTF-8 name"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Guess the authoritative branch
    ///
    /// `origin/HEAD` target, then `main`, then `master`, then the checked-out branch,
    /// then the first local branch.
    pub fn detect_default_branch(&self) -> Option<String> {
        let branches = self.list_branches().ok()?;
        if branches.is_empty() {
            return None;
        }

        if let Ok(reference) = self.repo.find_reference("refs/remotes/origin/HEAD")
            && let Some(target) = reference.symbolic_target()
            && let Some(name) = target.strip_prefix("refs/remotes/origin/")
            && branches.iter().any(|b| b == name)
        {
            return Some(name.to_string());
        }

        for candidate in ["main", "master"] {
            if branches.iter().any(|b| b == candidate) {
                return Some(candidate.to_string());
            }
        }

        self.current_branch()
            .filter(|current| branches.contains(current))
            .or_else(|| branches.first().cloned())
    }

    /// Resolve a local branch to its head commit hash
    pub fn branch_head(&self, name: &str) -> Result<String, GitError> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| {
                if e.code() == ErrorCode::NotFound {
                    GitError::BranchNotFound(name.to_string())
                } else {
                    GitError::HeadUnresolved {
                        branch: name.to_string(),
                        reason: e.message().to_string(),
                    }
                }
            })?;
        let commit = branch
            .get()
            .peel_to_commit()
            .map_err(|e| GitError::HeadUnresolved {
                branch: name.to_string(),
                reason: e.message().to_string(),
            })?;
        Ok(commit.id().to_string())
    }

    /// `user.name` / `user.email` from the repository's effective git config
    pub fn user_identity(&self) -> Option<UserIdentity> {
        let config = self.repo.config().ok()?;
        let name = config.get_string("user.name").ok();
        let email = config.get_string("user.email").ok();
        if name.is_none() && email.is_none() {
            return None;
        }
        Some(UserIdentity { name, email })
    }

    /// Most recent common ancestor of two commits, `None` when histories are unrelated
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        match self.repo.merge_base(parse_oid(a)?, parse_oid(b)?) {
            Ok(oid) => Ok(Some(oid.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::WalkFailed {
                start: a.to_string(),
                reason: format!("merge-base with {}: {}", b, e.message()),
            }),
        }
    }

    /// Whether `ancestor` is reachable from `descendant` (or equal to it)
    pub fn is_ancestor_or_self(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        self.repo
            .graph_descendant_of(parse_oid(descendant)?, parse_oid(ancestor)?)
            .map_err(|e| GitError::WalkFailed {
                start: descendant.to_string(),
                reason: e.message().to_string(),
            })
    }

    /// Whether the object database still contains this commit
    pub fn has_commit(&self, hash: &str) -> bool {
        Oid::from_str(hash)
            .ok()
            .and_then(|oid| self.repo.find_commit(oid).ok())
            .is_some()
    }

    /// Read the metadata of a single commit
    pub fn commit_meta(&self, hash: &str) -> Result<CommitMeta, GitError> {
        let oid = parse_oid(hash)?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| GitError::UnreadableObject {
                oid: hash.to_string(),
                reason: e.message().to_string(),
            })?;
        Ok(commit_meta(&commit))
    }

    /// Visit ancestors of `start` newest-first until `visit` asks to stop
    ///
    /// Commits reachable from `bounds.stop` or any `bounds.hide` tip are excluded;
    /// tips that cannot be resolved are logged and ignored.
    pub fn walk<F>(&self, start: &str, bounds: &WalkBounds, mut visit: F) -> Result<(), GitError>
    where
        F: FnMut(&CommitMeta) -> WalkControl,
    {
        let walk_err = |e: git2::Error| GitError::WalkFailed {
            start: start.to_string(),
            reason: e.message().to_string(),
        };

        let mut revwalk = self.repo.revwalk().map_err(walk_err)?;
        revwalk
            .set_sorting(Sort::TIME | Sort::TOPOLOGICAL)
            .map_err(walk_err)?;
        revwalk.push(parse_oid(start)?).map_err(walk_err)?;

        for tip in bounds.stop.iter().chain(bounds.hide.iter()) {
            let hidden = Oid::from_str(tip).and_then(|oid| revwalk.hide(oid));
            if let Err(e) = hidden {
                tracing::warn!(
                    "Ignoring unreachable walk boundary {}: {}",
                    crate::store::short_hash(tip),
                    e.message()
                );
            }
        }

        for oid in revwalk {
            let oid = oid.map_err(walk_err)?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| GitError::UnreadableObject {
                    oid: oid.to_string(),
                    reason: e.message().to_string(),
                })?;
            let meta = commit_meta(&commit);

            if let Some(since) = bounds.since
                && meta.author_time < since
            {
                break; // Commits are sorted, no need to continue
            }

            if visit(&meta) == WalkControl::Stop {
                break;
            }
        }

        Ok(())
    }

    /// Collect ancestors of `start` within `bounds`, newest first
    pub fn ancestors(&self, start: &str, bounds: &WalkBounds) -> Result<Vec<CommitMeta>, GitError> {
        let mut commits = Vec::new();
        self.walk(start, bounds, |meta| {
            commits.push(meta.clone());
            WalkControl::Continue
        })?;
        tracing::debug!(
            "Walked {} commits from {}",
            commits.len(),
            crate::store::short_hash(start)
        );
        Ok(commits)
    }
}

pub(crate) fn commit_meta(commit: &git2::Commit<'_>) -> CommitMeta {
    let author = commit.author();
    CommitMeta {
        hash: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author_name: author.name().unwrap_or("Unknown").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        author_time: author.when().seconds(),
        parent_hashes: commit.parent_ids().map(|p| p.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_repo::TestRepo;

    #[test]
    fn test_open_missing_repo() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = GitWalker::open(dir.path()).err().unwrap();
        assert!(matches!(err, GitError::RepoNotFound(_)));
    }

    #[test]
    fn test_branches_and_default_detection() {
        let repo = TestRepo::new();
        let a = repo.commit("main", "a.txt", "a\n", "A", 1_000);
        repo.branch_at("feature/x", &a);
        repo.branch_at("zeta", &a);

        let walker = repo.walker();
        assert_eq!(walker.list_branches().unwrap(), vec!["feature/x", "main", "zeta"]);
        assert_eq!(walker.detect_default_branch().as_deref(), Some("main"));
        assert_eq!(walker.branch_head("feature/x").unwrap(), a);
        assert!(matches!(
            walker.branch_head("missing"),
            Err(GitError::BranchNotFound(_))
        ));
    }

    #[test]
    fn test_walk_respects_stop_and_since() {
        let repo = TestRepo::new();
        let a = repo.commit("main", "f.txt", "1\n", "A", 1_000);
        let b = repo.commit("main", "f.txt", "2\n", "B", 2_000);
        let c = repo.commit("main", "f.txt", "3\n", "C", 3_000);
        let walker = repo.walker();

        let all = walker.ancestors(&c, &WalkBounds::default()).unwrap();
        let hashes: Vec<_> = all.iter().map(|m| m.hash.clone()).collect();
        assert_eq!(hashes, vec![c.clone(), b.clone(), a.clone()]);

        let bounded = WalkBounds {
            stop: Some(a.clone()),
            ..Default::default()
        };
        let hashes: Vec<_> = walker
            .ancestors(&c, &bounded)
            .unwrap()
            .into_iter()
            .map(|m| m.hash)
            .collect();
        assert_eq!(hashes, vec![c.clone(), b.clone()]);

        let recent = WalkBounds {
            since: Some(2_500),
            ..Default::default()
        };
        assert_eq!(walker.ancestors(&c, &recent).unwrap().len(), 1);
    }

    #[test]
    fn test_walk_control_stops_early() {
        let repo = TestRepo::new();
        repo.commit("main", "f.txt", "1\n", "A", 1_000);
        repo.commit("main", "f.txt", "2\n", "B", 2_000);
        let head = repo.commit("main", "f.txt", "3\n", "C", 3_000);

        let mut seen = 0;
        repo.walker()
            .walk(&head, &WalkBounds::default(), |_| {
                seen += 1;
                if seen == 2 {
                    WalkControl::Stop
                } else {
                    WalkControl::Continue
                }
            })
            .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_merge_base_and_ancestry() {
        let repo = TestRepo::new();
        let a = repo.commit("main", "f.txt", "1\n", "A", 1_000);
        repo.branch_at("feature/x", &a);
        let b = repo.commit("feature/x", "g.txt", "b\n", "B", 2_000);
        let d = repo.commit("main", "f.txt", "2\n", "D", 2_500);

        let walker = repo.walker();
        assert_eq!(walker.merge_base(&b, &d).unwrap().as_deref(), Some(a.as_str()));
        assert!(walker.is_ancestor_or_self(&a, &d).unwrap());
        assert!(walker.is_ancestor_or_self(&d, &d).unwrap());
        assert!(!walker.is_ancestor_or_self(&b, &d).unwrap());
    }

    #[test]
    fn test_unrelated_histories_have_no_merge_base() {
        let repo = TestRepo::new();
        let a = repo.commit("main", "f.txt", "1\n", "A", 1_000);
        let orphan = repo.commit("orphan", "o.txt", "o\n", "O", 1_500);
        assert_eq!(repo.walker().merge_base(&a, &orphan).unwrap(), None);
    }

    #[test]
    fn test_commit_meta_fields() {
        let repo = TestRepo::new();
        let a = repo.commit("main", "f.txt", "1\n", "Initial import\n\nBody", 1_234);
        let meta = repo.walker().commit_meta(&a).unwrap();
        assert_eq!(meta.hash.len(), 40);
        assert_eq!(meta.author_time, 1_234);
        assert_eq!(meta.author_email, TestRepo::EMAIL);
        assert!(meta.parent_hashes.is_empty());
        assert!(meta.message.starts_with("Initial import"));
    }

    #[test]
    fn test_user_identity_from_config() {
        let repo = TestRepo::new();
        repo.set_identity("Local Dev", "local@example.com");
        let identity = repo.walker().user_identity().unwrap();
        assert_eq!(identity.email.as_deref(), Some("local@example.com"));
        assert_eq!(identity.name.as_deref(), Some("Local Dev"));
    }
}
