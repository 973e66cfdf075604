/// End-to-end tests: git repository -> ingestion -> cached worklog
use anyhow::Result;
use chrono::NaiveDate;
use git2::{Repository, RepositoryInitOptions, Signature, Time};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use worklog::config::Config;
use worklog::error::SelectionError;
use worklog::ingest::{
    BranchPrompt, BranchRequest, BranchSelection, BranchSelector, IngestionEngine, SavedChoice,
    UserMatch, inspect_repository,
};
use worklog::llm::{ChatMessage, LanguageModelClient};
use worklog::store::{GroupBy, Store};
use worklog::worklog::WorklogGenerator;
use worklog::worklog::assemble::day_start;

const EMAIL: &str = "dev@example.com";

/// Language model stand-in that counts every request
struct CountingModel {
    calls: AtomicUsize,
}

impl CountingModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LanguageModelClient for CountingModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Completion {n}"))
    }

    async fn chat_complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Chat {n}"))
    }

    fn model_name(&self) -> &str {
        "counting-model"
    }
}

fn as_llm(model: &Arc<CountingModel>) -> Option<Arc<dyn LanguageModelClient>> {
    let llm: Arc<dyn LanguageModelClient> = model.clone();
    Some(llm)
}

/// Repository whose commits are written straight into the object database
struct Repo {
    dir: TempDir,
    repo: Repository,
}

impl Repo {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts)?;
        Ok(Self { dir, repo })
    }

    fn commit(&self, branch: &str, file: &str, content: &str, message: &str, time: i64) -> Result<String> {
        let refname = format!("refs/heads/{branch}");
        let parent = self
            .repo
            .find_reference(&refname)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());
        let parent_tree = match &parent {
            Some(p) => Some(p.tree()?),
            None => None,
        };

        let mut builder = self.repo.treebuilder(parent_tree.as_ref())?;
        let blob = self.repo.blob(content.as_bytes())?;
        builder.insert(file, blob, 0o100644)?;
        let tree = self.repo.find_tree(builder.write()?)?;

        let sig = Signature::new("Dev", EMAIL, &Time::new(time, 0))?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some(&refname), &sig, &sig, message, &tree, &parents)?;
        Ok(oid.to_string())
    }

    fn branch(&self, name: &str, from: &str) -> Result<()> {
        let commit = self.repo.find_commit(git2::Oid::from_str(from)?)?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn at(day: u32, hour: i64) -> i64 {
    day_start(march(day)) + hour * 3600
}

/// main: A, B (Mar 4), D (Mar 5); feature/x forked at B: C (Mar 5)
fn seeded_repo() -> Result<(Repo, Vec<String>)> {
    let repo = Repo::new()?;
    let a = repo.commit("main", "README.md", "hello\n", "Initial commit", at(4, 9))?;
    let b = repo.commit("main", "lib.rs", "fn a() {}\n", "Add lib", at(4, 11))?;
    repo.branch("feature/x", &b)?;
    let c = repo.commit("feature/x", "x.rs", "fn x() {}\n", "Start feature x", at(5, 10))?;
    let d = repo.commit("main", "lib.rs", "fn a() {}\nfn b() {}\n", "Add b", at(5, 12))?;
    Ok((repo, vec![a, b, c, d]))
}

fn user() -> UserMatch {
    UserMatch {
        email: Some(EMAIL.to_string()),
        github_handle: None,
    }
}

fn selection() -> BranchSelection {
    BranchSelection::normalized("main", &["main".to_string(), "feature/x".to_string()])
}

#[tokio::test]
async fn test_ingest_then_worklog_reuses_everything() -> Result<()> {
    let (repo, hashes) = seeded_repo()?;
    let db_dir = TempDir::new()?;
    let store = Arc::new(Store::open(&db_dir.path().join("worklog.db"))?);
    let model = CountingModel::new();

    let engine = IngestionEngine::new(store.clone(), Config::default().ingest, as_llm(&model))?;
    let overview = inspect_repository(repo.dir.path()).await?;
    assert_eq!(overview.detected_default.as_deref(), Some("main"));
    let codebase = engine.register_codebase(&overview)?;

    let report = engine
        .ingest_selection(&codebase, &selection(), None, &user())
        .await?;
    assert_eq!(report.commits_ingested(), 4);
    assert_eq!(report.branches[0].branch, "main");
    assert_eq!(report.branches[1].result.as_ref().unwrap().commits_ingested, 1);
    // The root commit has no parent diff, so only B, C and D are summarized
    assert_eq!(model.calls(), 3);
    assert_eq!(store.get_cursor(codebase.id, "main")?.as_deref(), Some(hashes[3].as_str()));

    // Nothing new: no commits, no cursor change, no model calls
    let again = engine
        .ingest_selection(&codebase, &selection(), None, &user())
        .await?;
    assert_eq!(again.commits_ingested(), 0);
    assert_eq!(model.calls(), 3);
    assert_eq!(store.get_cursor(codebase.id, "main")?.as_deref(), Some(hashes[3].as_str()));

    let generator = WorklogGenerator::new(
        store.clone(),
        Config::default().worklog,
        "default",
        as_llm(&model),
    )
    .with_today(march(20));

    // Mar 4 main, Mar 5 main, Mar 5 feature/x, one week, one month
    let first = generator
        .generate(&codebase, march(1), march(31), GroupBy::Date)
        .await?;
    assert_eq!((first.generated, first.cached), (5, 0));
    assert_eq!(model.calls(), 8);

    let second = generator
        .generate(&codebase, march(1), march(31), GroupBy::Date)
        .await?;
    assert_eq!((second.generated, second.cached), (0, 5));
    assert_eq!(second.markdown, first.markdown);
    assert_eq!(model.calls(), 8);

    // A same-day commit on main invalidates that day, its week and its month
    repo.commit("main", "lib.rs", "fn a() {}\nfn b() {}\nfn c() {}\n", "Add c", at(5, 15))?;
    let report = engine
        .ingest_selection(&codebase, &selection(), None, &user())
        .await?;
    assert_eq!(report.commits_ingested(), 1);
    assert_eq!(model.calls(), 9);

    let third = generator
        .generate(&codebase, march(1), march(31), GroupBy::Date)
        .await?;
    assert_eq!((third.generated, third.cached), (3, 2));
    assert_eq!(model.calls(), 12);
    Ok(())
}

#[tokio::test]
async fn test_feature_branch_holds_only_unique_commits() -> Result<()> {
    let (repo, hashes) = seeded_repo()?;
    let store = Arc::new(Store::open_in_memory()?);
    let mut config = Config::default().ingest;
    config.generate_summaries = false;
    let engine = IngestionEngine::new(store.clone(), config, None)?;

    let overview = inspect_repository(repo.dir.path()).await?;
    let codebase = engine.register_codebase(&overview)?;
    engine
        .ingest_selection(&codebase, &selection(), None, &user())
        .await?;

    let main = store.get_branch(codebase.id, "main")?.unwrap();
    let feature = store.get_branch(codebase.id, "feature/x")?.unwrap();
    let main_hashes: Vec<String> = store
        .commits_for_branch(main.id)?
        .into_iter()
        .map(|c| c.hash)
        .collect();
    let feature_hashes: Vec<String> = store
        .commits_for_branch(feature.id)?
        .into_iter()
        .map(|c| c.hash)
        .collect();

    assert_eq!(main_hashes, vec![hashes[3].clone(), hashes[1].clone(), hashes[0].clone()]);
    assert_eq!(feature_hashes, vec![hashes[2].clone()]);
    assert!(main.is_default);
    assert!(!feature.is_default);
    Ok(())
}

#[tokio::test]
async fn test_cursor_survives_reopen() -> Result<()> {
    let (repo, hashes) = seeded_repo()?;
    let db_dir = TempDir::new()?;
    let db_path = db_dir.path().join("nested").join("worklog.db");
    let mut config = Config::default().ingest;
    config.generate_summaries = false;

    let codebase_id = {
        let store = Arc::new(Store::open(&db_path)?);
        let engine = IngestionEngine::new(store, config.clone(), None)?;
        let overview = inspect_repository(repo.dir.path()).await?;
        let codebase = engine.register_codebase(&overview)?;
        engine
            .ingest_branch(&codebase, "main", "", None, Some(EMAIL), None)
            .await?;
        codebase.id
    };

    let store = Arc::new(Store::open(&db_path)?);
    assert_eq!(store.get_cursor(codebase_id, "main")?.as_deref(), Some(hashes[3].as_str()));

    let engine = IngestionEngine::new(store.clone(), config, None)?;
    let codebase = store.get_codebase(codebase_id)?.unwrap();
    let stats = engine
        .ingest_branch(&codebase, "main", "", None, Some(EMAIL), None)
        .await?;
    assert_eq!(stats.commits_ingested, 0);
    assert!(!stats.cursor_advanced);
    Ok(())
}

#[test]
fn test_only_one_default_branch_per_codebase() -> Result<()> {
    let store = Store::open_in_memory()?;
    let codebase = store.upsert_codebase("/work/repo", "repo")?;
    store.ensure_branch(codebase.id, "develop", "main")?;
    store.set_default_branch(codebase.id, "main")?;
    store.set_default_branch(codebase.id, "develop")?;
    store.set_default_branch(codebase.id, "release")?;
    store.set_default_branch(codebase.id, "develop")?;

    let defaults: Vec<String> = store
        .list_branches(codebase.id)?
        .into_iter()
        .filter(|b| b.is_default)
        .map(|b| b.name)
        .collect();
    assert_eq!(defaults, vec!["develop".to_string()]);
    assert_eq!(store.get_codebase(codebase.id)?.unwrap().default_branch, "develop");
    Ok(())
}

/// Prompt that keeps whatever was saved and refuses to pick from scratch
struct KeepSaved;

impl BranchPrompt for KeepSaved {
    fn choose_saved(&mut self, _saved: &BranchSelection) -> Result<SavedChoice, SelectionError> {
        Ok(SavedChoice::Keep)
    }

    fn select(
        &mut self,
        _available: &[String],
        _preselected: &[String],
        _suggested_default: &str,
    ) -> Result<BranchSelection, SelectionError> {
        Err(SelectionError::PromptFailed("no saved selection".to_string()))
    }
}

#[test]
fn test_selection_is_remembered_between_runs() -> Result<()> {
    let dir = TempDir::new()?;
    let store_path = dir.path().join("branch_selections.json");
    let available = vec![
        "feature/x".to_string(),
        "main".to_string(),
        "spike".to_string(),
    ];
    let selector = BranchSelector::new(available, Some("main".to_string()), store_path.clone());

    let explicit = selector.resolve(
        "/work/repo",
        &BranchRequest::Explicit(vec!["main".to_string(), "feature/x".to_string()]),
        &mut KeepSaved,
    )?;
    assert_eq!(explicit.default_branch, "main");

    let remembered = selector.resolve("/work/repo", &BranchRequest::Remembered, &mut KeepSaved)?;
    assert_eq!(remembered, explicit);

    // Another repository has nothing saved and must prompt
    assert!(
        selector
            .resolve("/work/other", &BranchRequest::Remembered, &mut KeepSaved)
            .is_err()
    );
    Ok(())
}
