//! Throwaway repositories for unit tests, built directly through libgit2

use super::GitWalker;
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::path::Path;
use tempfile::TempDir;

pub(crate) struct TestRepo {
    dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub const NAME: &'static str = "Dev";
    pub const EMAIL: &'static str = "dev@example.com";

    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn walker(&self) -> GitWalker {
        GitWalker::open(self.path()).unwrap()
    }

    /// Commit one file write on `branch` as the default test author
    pub fn commit(&self, branch: &str, file: &str, content: &str, message: &str, time: i64) -> String {
        self.commit_files(
            branch,
            &[(file, Some(content))],
            message,
            time,
            Self::NAME,
            Self::EMAIL,
        )
    }

    /// Commit a set of top-level file writes (`Some`) and deletions (`None`)
    pub fn commit_files(
        &self,
        branch: &str,
        files: &[(&str, Option<&str>)],
        message: &str,
        time: i64,
        name: &str,
        email: &str,
    ) -> String {
        let raw: Vec<(&str, Option<&[u8]>)> = files
            .iter()
            .map(|(file, content)| (*file, content.map(str::as_bytes)))
            .collect();
        self.commit_raw(branch, &raw, message, time, name, email)
    }

    /// Like [`Self::commit_files`] with arbitrary file bytes
    pub fn commit_raw(
        &self,
        branch: &str,
        files: &[(&str, Option<&[u8]>)],
        message: &str,
        time: i64,
        name: &str,
        email: &str,
    ) -> String {
        let refname = format!("refs/heads/{branch}");
        let parent = self
            .repo
            .find_reference(&refname)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());
        let parent_tree = parent.as_ref().map(|p| p.tree().unwrap());

        let mut builder = self.repo.treebuilder(parent_tree.as_ref()).unwrap();
        for (file, content) in files {
            match content {
                Some(content) => {
                    let blob = self.repo.blob(content).unwrap();
                    builder.insert(file, blob, 0o100644).unwrap();
                }
                None => builder.remove(file).unwrap(),
            }
        }
        let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();

        let sig = Signature::new(name, email, &Time::new(time, 0)).unwrap();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(Some(&refname), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    pub fn branch_at(&self, name: &str, hash: &str) {
        let commit = self.repo.find_commit(Oid::from_str(hash).unwrap()).unwrap();
        self.repo.branch(name, &commit, true).unwrap();
    }

    pub fn delete_branch(&self, name: &str) {
        let mut branch = self.repo.find_branch(name, git2::BranchType::Local).unwrap();
        branch.delete().unwrap();
    }

    pub fn set_identity(&self, name: &str, email: &str) {
        let mut config = self
            .repo
            .config()
            .unwrap()
            .open_level(git2::ConfigLevel::Local)
            .unwrap();
        config.set_str("user.name", name).unwrap();
        config.set_str("user.email", email).unwrap();
    }
}
