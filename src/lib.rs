//! # Worklog - Incremental Git Ingestion and Cached Worklog Summaries
//!
//! Turns a developer's git history into daily, weekly and monthly worklogs.
//! Commits are ingested incrementally into a local SQLite store, and every
//! rendered worklog unit is cached under a signature of the commits that
//! produced it, so re-running over unchanged history costs no language-model
//! calls.
//!
//! ## Overview
//!
//! Ingestion walks each selected branch from its head down to the last
//! ingested commit (the branch cursor). The default branch contributes its
//! whole history; feature branches contribute only commits that are not
//! reachable from the default branch. Diffs are computed on a bounded worker
//! pool while a single consumer persists results.
//!
//! Worklog generation groups stored commits by day and branch, rolls the
//! rendered days up into ISO weeks and the rendered weeks up into months.
//! The current day is never served from cache.
//!
//! ## Architecture
//!
//! ```text
//!  git repository
//!        │
//! ┌──────▼───────┐   ┌──────────────┐
//! │  GitWalker   │──▶│   DiffPool   │  (rayon workers)
//! └──────┬───────┘   └──────┬───────┘
//!        │                  │ mpsc
//! ┌──────▼──────────────────▼───────┐   ┌───────────────────┐
//! │         IngestionEngine         │──▶│ LanguageModelClient│ (optional)
//! └──────────────┬──────────────────┘   └─────────▲─────────┘
//!                │                                │
//!         ┌──────▼──────┐   ┌─────────────────────┴─┐
//!         │ Store       │◀──│ WorklogGenerator      │
//!         │ (SQLite)    │   │  └ WorklogCache       │
//!         └─────────────┘   └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`git`]: history walking, per-commit diffs and the parallel diff pool
//! - [`ingest`]: branch selection, user matching and the ingestion engine
//! - [`worklog`]: signatures, the worklog cache and day/week/month rollups
//! - [`store`]: SQLite persistence for every entity
//! - [`llm`]: the injected language-model seam and prompt builders
//! - [`config`]: configuration with defaults and environment overrides
//! - [`error`]: error taxonomy and severity classification
//! - [`paths`]: platform data and config locations
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use worklog::config::Config;
//! use worklog::ingest::{inspect_repository, BranchSelection, IngestionEngine, UserMatch};
//! use worklog::store::{GroupBy, Store};
//! use worklog::worklog::WorklogGenerator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::new()?;
//!     config.ingest.generate_summaries = false;
//!     let store = Arc::new(Store::open(&config.store.db_path)?);
//!
//!     let overview = inspect_repository(Path::new(".")).await?;
//!     let engine = IngestionEngine::new(store.clone(), config.ingest.clone(), None)?;
//!     let codebase = engine.register_codebase(&overview)?;
//!     let selection = BranchSelection::normalized("main", &overview.branches);
//!     engine
//!         .ingest_selection(&codebase, &selection, None, &UserMatch::default())
//!         .await?;
//!
//!     let today = chrono::Local::now().date_naive();
//!     let generator = WorklogGenerator::new(store, config.worklog.clone(), "default", None);
//!     let output = generator.generate(&codebase, today, today, GroupBy::Date).await?;
//!     println!("{}", output.markdown);
//!     Ok(())
//! }
//! ```

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and severity classification
pub mod error;

/// Git history walking, diffing and the parallel diff pool
pub mod git;

/// Incremental ingestion of selected branches into the store
pub mod ingest;

/// Language-model client seam and prompt construction
pub mod llm;

/// Platform-specific data and config locations
pub mod paths;

/// SQLite persistence for codebases, commits, cursors and worklog entries
pub mod store;

/// Cached day, week, month and branch worklog generation
pub mod worklog;
