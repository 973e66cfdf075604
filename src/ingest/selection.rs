//! Branch Selector: which branches to ingest and which one is authoritative
//!
//! Accepted selections are remembered per repository in a small JSON file so
//! the next run can offer them back.

use crate::error::SelectionError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved set of branches for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSelection {
    /// Authoritative branch; other branches ingest only commits not on it
    pub default_branch: String,
    /// Branches to ingest this run
    pub branches: Vec<String>,
}

impl BranchSelection {
    /// Selection with the default branch first and no duplicates
    pub fn normalized(default_branch: &str, branches: &[String]) -> Self {
        let mut ordered = vec![default_branch.to_string()];
        for branch in branches {
            if !ordered.contains(branch) {
                ordered.push(branch.clone());
            }
        }
        Self {
            default_branch: default_branch.to_string(),
            branches: ordered,
        }
    }

    /// Drop branches that no longer exist; `None` when the default itself is gone
    pub fn filter_existing(&self, available: &[String]) -> Option<Self> {
        if !available.contains(&self.default_branch) {
            return None;
        }
        let branches: Vec<String> = self
            .branches
            .iter()
            .filter(|b| available.contains(b))
            .cloned()
            .collect();
        Some(Self::normalized(&self.default_branch, &branches))
    }
}

/// How the caller asked for branches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchRequest {
    /// Exactly these branches
    Explicit(Vec<String>),
    /// Every local branch
    All,
    /// Reuse a saved selection or ask interactively
    Remembered,
}

/// Answer to "a saved selection exists, what now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedChoice {
    Keep,
    Modify,
    Reselect,
}

/// Interactive front end used when no explicit choice was given
pub trait BranchPrompt {
    /// Offer a still-valid saved selection back to the user
    fn choose_saved(&mut self, saved: &BranchSelection) -> Result<SavedChoice, SelectionError>;

    /// Let the user pick branches and a default from `available`
    fn select(
        &mut self,
        available: &[String],
        preselected: &[String],
        suggested_default: &str,
    ) -> Result<BranchSelection, SelectionError>;
}

/// Saved selections keyed by repository path
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SelectionStore {
    pub repos: HashMap<String, BranchSelection>,
}

impl SelectionStore {
    /// Get the default selections file path
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_selection_path()
    }

    /// Load selections from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Branch selection file not found, starting empty");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read branch selection file")?;
        let store: SelectionStore =
            serde_json::from_str(&content).context("Failed to parse branch selection file")?;

        tracing::debug!(
            "Loaded branch selections for {} repositories",
            store.repos.len()
        );
        Ok(store)
    }

    /// Save selections to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create branch selection directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize branch selections")?;
        fs::write(path, content).context("Failed to write branch selection file")?;

        tracing::debug!("Saved branch selections to {:?}", path);
        Ok(())
    }

    pub fn get(&self, repo: &str) -> Option<&BranchSelection> {
        self.repos.get(repo)
    }

    pub fn set(&mut self, repo: String, selection: BranchSelection) {
        self.repos.insert(repo, selection);
    }

    pub fn remove(&mut self, repo: &str) -> bool {
        self.repos.remove(repo).is_some()
    }
}

/// Resolves a [`BranchRequest`] against the branches that exist right now
pub struct BranchSelector {
    available: Vec<String>,
    detected_default: Option<String>,
    store_path: PathBuf,
}

impl BranchSelector {
    pub fn new(available: Vec<String>, detected_default: Option<String>, store_path: PathBuf) -> Self {
        Self {
            available,
            detected_default,
            store_path,
        }
    }

    fn default_guess(&self) -> Result<&str, SelectionError> {
        self.detected_default
            .as_deref()
            .filter(|d| self.available.iter().any(|b| b == d))
            .or_else(|| self.available.first().map(String::as_str))
            .ok_or(SelectionError::NoBranches)
    }

    fn check_known(&self, names: &[String]) -> Result<(), SelectionError> {
        let unknown: Vec<&str> = names
            .iter()
            .filter(|n| !self.available.contains(n))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SelectionError::UnknownBranches(unknown.join(", ")))
        }
    }

    fn validated(&self, picked: BranchSelection) -> Result<BranchSelection, SelectionError> {
        if picked.branches.is_empty() {
            return Err(SelectionError::Empty);
        }
        self.check_known(&picked.branches)?;
        self.check_known(std::slice::from_ref(&picked.default_branch))?;
        Ok(BranchSelection::normalized(
            &picked.default_branch,
            &picked.branches,
        ))
    }

    /// Resolve the selection for `repo_key` and remember it
    ///
    /// Precedence: explicit list, then all branches, then a saved selection
    /// (keep, modify or reselect), then a fresh interactive pick. A saved
    /// selection whose default branch is gone is discarded.
    pub fn resolve(
        &self,
        repo_key: &str,
        request: &BranchRequest,
        prompt: &mut dyn BranchPrompt,
    ) -> Result<BranchSelection, SelectionError> {
        let default = self.default_guess()?.to_string();

        let selection = match request {
            BranchRequest::Explicit(names) => {
                if names.is_empty() {
                    return Err(SelectionError::Empty);
                }
                self.check_known(names)?;
                BranchSelection {
                    default_branch: default,
                    branches: names.clone(),
                }
            }
            BranchRequest::All => BranchSelection::normalized(&default, &self.available),
            BranchRequest::Remembered => {
                let saved = self.load_store().get(repo_key).cloned();
                match saved.and_then(|s| s.filter_existing(&self.available)) {
                    Some(saved) => match prompt.choose_saved(&saved)? {
                        SavedChoice::Keep => saved,
                        SavedChoice::Modify => self.validated(prompt.select(
                            &self.available,
                            &saved.branches,
                            &saved.default_branch,
                        )?)?,
                        SavedChoice::Reselect => {
                            self.validated(prompt.select(&self.available, &[], &default)?)?
                        }
                    },
                    None => self.validated(prompt.select(&self.available, &[], &default)?)?,
                }
            }
        };

        self.remember(repo_key, &selection);
        tracing::info!(
            "Selected {} branch(es), default '{}'",
            selection.branches.len(),
            selection.default_branch
        );
        Ok(selection)
    }

    fn load_store(&self) -> SelectionStore {
        SelectionStore::load(&self.store_path).unwrap_or_else(|e| {
            let err = SelectionError::LoadFailed {
                path: self.store_path.display().to_string(),
                reason: format!("{:#}", e),
            };
            tracing::warn!("{}, ignoring saved selections", err);
            SelectionStore::default()
        })
    }

    fn remember(&self, repo_key: &str, selection: &BranchSelection) {
        let mut store = self.load_store();
        store.set(repo_key.to_string(), selection.clone());
        if let Err(e) = store.save(&self.store_path) {
            let err = SelectionError::SaveFailed {
                path: self.store_path.display().to_string(),
                reason: format!("{:#}", e),
            };
            tracing::warn!("{}", err);
        }
    }
}
