use anyhow::{Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use worklog::config::{Config, IdentityConfig};
use worklog::error::{SelectionError, StoreError};
use worklog::git::UserIdentity;
use worklog::ingest::{
    BranchPrompt, BranchRequest, BranchSelection, BranchSelector, IngestionEngine, SavedChoice,
    SelectionStore, UserMatch, inspect_repository,
};
use worklog::store::{GroupBy, Store};
use worklog::worklog::WorklogGenerator;
use worklog::worklog::assemble::day_start;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("WORKLOG_GIT_REVISION"),
    ", built ",
    env!("WORKLOG_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "worklog")]
#[command(version = VERSION)]
#[command(about = "Incremental git ingestion and cached worklog summaries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to the platform config location)
    #[arg(short, long, env = "WORKLOG_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config file
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupMode {
    Date,
    Branch,
}

impl From<GroupMode> for GroupBy {
    fn from(mode: GroupMode) -> Self {
        match mode {
            GroupMode::Date => GroupBy::Date,
            GroupMode::Branch => GroupBy::Branch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new commits of the selected branches
    Ingest {
        /// Repository path (any directory inside the work tree)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Branches to ingest, comma separated (skips the interactive prompt)
        #[arg(short, long, value_delimiter = ',')]
        branches: Vec<String>,

        /// Ingest every local branch
        #[arg(long, conflicts_with = "branches")]
        all: bool,

        /// Ignore commits authored before this date (YYYY-MM-DD, RFC 3339 or Unix seconds)
        #[arg(long)]
        since: Option<String>,

        /// Email identifying your commits
        #[arg(long)]
        email: Option<String>,

        /// GitHub handle matched against no-reply author emails
        #[arg(long)]
        github: Option<String>,

        /// Diff worker threads (0 = available parallelism)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Render the worklog for a date range
    Worklog {
        /// Repository path
        #[arg(default_value = ".")]
        path: PathBuf,

        /// First day (YYYY-MM-DD), defaults to six days ago
        #[arg(long)]
        from: Option<String>,

        /// Last day (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<String>,

        /// Organise sections by date or by branch
        #[arg(long, value_enum, default_value = "date")]
        group_by: GroupMode,

        /// Include commits from every author
        #[arg(long)]
        all_authors: bool,

        /// Write markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show branches, the detected default and the saved selection
    Branches {
        /// Repository path
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("worklog=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default()?,
    };
    config.apply_env_overrides();
    if let Some(db) = &cli.db {
        config.store.db_path = db.clone();
    }

    match cli.command {
        Commands::Ingest {
            path,
            branches,
            all,
            since,
            email,
            github,
            workers,
        } => {
            if let Some(workers) = workers {
                config.ingest.workers = workers;
            }
            config.validate()?;
            let request = if !branches.is_empty() {
                BranchRequest::Explicit(branches)
            } else if all {
                BranchRequest::All
            } else {
                BranchRequest::Remembered
            };
            let since = since.as_deref().map(parse_date_filter).transpose()?;
            run_ingest(config, &path, request, since, email, github).await
        }
        Commands::Worklog {
            path,
            from,
            to,
            group_by,
            all_authors,
            output,
        } => {
            if all_authors {
                config.worklog.only_user_commits = false;
            }
            config.validate()?;
            let today = Local::now().date_naive();
            let end = to.as_deref().map(parse_day).transpose()?.unwrap_or(today);
            let start = match from.as_deref() {
                Some(s) => parse_day(s)?,
                None => end.checked_sub_days(Days::new(6)).unwrap_or(end),
            };
            run_worklog(config, &path, start, end, group_by.into(), output).await
        }
        Commands::Branches { path } => run_branches(config, &path).await,
    }
}

/// Flags win over the config file, which wins over the repository's git identity
fn resolve_user(
    email: Option<String>,
    github: Option<String>,
    configured: &IdentityConfig,
    repo_identity: Option<&UserIdentity>,
) -> UserMatch {
    UserMatch {
        email: email
            .or_else(|| configured.email.clone())
            .or_else(|| repo_identity.and_then(|i| i.email.clone())),
        github_handle: github.or_else(|| configured.github_handle.clone()),
    }
}

async fn run_ingest(
    mut config: Config,
    path: &Path,
    request: BranchRequest,
    since: Option<i64>,
    email: Option<String>,
    github: Option<String>,
) -> Result<()> {
    let overview = inspect_repository(path).await?;
    let selector = BranchSelector::new(
        overview.branches.clone(),
        overview.detected_default.clone(),
        config.selection.path.clone(),
    );
    let repo_key = overview.root.display().to_string();
    let selection = selector.resolve(&repo_key, &request, &mut StdinPrompt)?;

    let user = resolve_user(email, github, &config.identity, overview.identity.as_ref());
    if user.email.is_none() && user.github_handle.is_none() {
        tracing::warn!("No user identity configured; no commit will be marked as yours");
    }

    // This binary links no language-model backend
    if config.ingest.generate_summaries {
        tracing::info!("No language model configured, commit summaries disabled");
        config.ingest.generate_summaries = false;
    }

    let store = Arc::new(Store::open(&config.store.db_path)?);
    let engine = IngestionEngine::new(store, config.ingest.clone(), None)?.with_progress(
        Arc::new(|done: usize, total: usize| tracing::debug!("Diffed {}/{} commits", done, total)),
    );
    let codebase = engine.register_codebase(&overview)?;
    let report = engine
        .ingest_selection(&codebase, &selection, since, &user)
        .await?;

    let mut stdout = std::io::stdout().lock();
    for outcome in &report.branches {
        match &outcome.result {
            Ok(stats) => writeln!(
                stdout,
                "{:<30} {} new commits, {} file changes, {} already stored{}",
                outcome.branch,
                stats.commits_ingested,
                stats.file_changes_ingested,
                stats.commits_skipped,
                if stats.commits_failed > 0 {
                    format!(", {} failed", stats.commits_failed)
                } else {
                    String::new()
                }
            )?,
            Err(e) => writeln!(stdout, "{:<30} skipped: {}", outcome.branch, e)?,
        }
    }
    writeln!(
        stdout,
        "Ingested {} commits in {} ms",
        report.commits_ingested(),
        report.duration_ms
    )?;
    Ok(())
}

async fn run_worklog(
    config: Config,
    path: &Path,
    start: NaiveDate,
    end: NaiveDate,
    group_by: GroupBy,
    output: Option<PathBuf>,
) -> Result<()> {
    let overview = inspect_repository(path).await?;
    let store = Arc::new(Store::open(&config.store.db_path)?);
    let root = overview.root.display().to_string();
    let codebase = store
        .get_codebase_by_path(&root)?
        .ok_or(StoreError::CodebaseNotFound(root))
        .context("Run `worklog ingest` for this repository first")?;

    let generator = WorklogGenerator::new(
        store,
        config.worklog.clone(),
        &config.identity.profile,
        None,
    );
    let result = generator.generate(&codebase, start, end, group_by).await?;

    match output {
        Some(file) => {
            std::fs::write(&file, &result.markdown)
                .with_context(|| format!("Failed to write worklog to {}", file.display()))?;
            tracing::info!("Wrote {}", file.display());
        }
        None => print!("{}", result.markdown),
    }
    Ok(())
}

async fn run_branches(config: Config, path: &Path) -> Result<()> {
    let overview = inspect_repository(path).await?;
    let saved = SelectionStore::load(&config.selection.path)?;
    let root = overview.root.display().to_string();
    let selection = saved.get(&root);

    let store = Store::open(&config.store.db_path)?;
    let codebase = store.get_codebase_by_path(&root)?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{} ({})", overview.name, root)?;
    for branch in &overview.branches {
        let is_default = overview.detected_default.as_deref() == Some(branch.as_str());
        let selected = selection.is_some_and(|s| s.branches.contains(branch));
        let cursor = match &codebase {
            Some(cb) => store.get_cursor(cb.id, branch)?,
            None => None,
        };
        writeln!(
            stdout,
            "{} {} {:<30} {}",
            if is_default { "D" } else { " " },
            if selected { "*" } else { " " },
            branch,
            cursor
                .as_deref()
                .map(worklog::store::short_hash)
                .unwrap_or("-")
        )?;
    }
    if let Some(selection) = selection {
        writeln!(stdout, "\nSaved default: {}", selection.default_branch)?;
    }
    Ok(())
}

/// Parse a date filter string (Unix seconds, RFC 3339 or YYYY-MM-DD local midnight)
fn parse_date_filter(date_str: &str) -> Result<i64> {
    if let Ok(timestamp) = date_str.parse::<i64>() {
        return Ok(timestamp);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Ok(dt.timestamp());
    }

    if let Ok(day) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(day_start(day));
    }

    anyhow::bail!("Invalid date format: {}", date_str)
}

fn parse_day(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date (expected YYYY-MM-DD): {}", date_str))
}

/// Line-based branch prompt on stdin/stderr
struct StdinPrompt;

impl StdinPrompt {
    fn ask(question: &str) -> Result<String, SelectionError> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{} ", question)
            .and_then(|_| stderr.flush())
            .map_err(|e| SelectionError::PromptFailed(e.to_string()))?;
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| SelectionError::PromptFailed(e.to_string()))?;
        Ok(line.trim().to_string())
    }
}

impl BranchPrompt for StdinPrompt {
    fn choose_saved(&mut self, saved: &BranchSelection) -> Result<SavedChoice, SelectionError> {
        eprintln!(
            "Saved selection: {} (default {})",
            saved.branches.join(", "),
            saved.default_branch
        );
        loop {
            match Self::ask("[k]eep, [m]odify or [r]eselect? [k]")?
                .to_lowercase()
                .as_str()
            {
                "" | "k" | "keep" => return Ok(SavedChoice::Keep),
                "m" | "modify" => return Ok(SavedChoice::Modify),
                "r" | "reselect" => return Ok(SavedChoice::Reselect),
                other => eprintln!("Unrecognised answer '{}'", other),
            }
        }
    }

    fn select(
        &mut self,
        available: &[String],
        preselected: &[String],
        suggested_default: &str,
    ) -> Result<BranchSelection, SelectionError> {
        for (i, branch) in available.iter().enumerate() {
            let mark = if preselected.contains(branch) { "*" } else { " " };
            eprintln!("{:>3} {} {}", i + 1, mark, branch);
        }
        let answer =
            Self::ask("Branches (numbers or names, comma separated; empty keeps the marked ones):")?;
        let branches: Vec<String> = if answer.is_empty() {
            preselected.to_vec()
        } else {
            answer
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| match s.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= available.len() => available[n - 1].clone(),
                    _ => s.to_string(),
                })
                .collect()
        };

        let default = Self::ask(&format!("Default branch [{}]:", suggested_default))?;
        let default = if default.is_empty() {
            suggested_default.to_string()
        } else {
            default
        };
        Ok(BranchSelection::normalized(&default, &branches))
    }
}
