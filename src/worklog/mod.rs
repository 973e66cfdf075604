//! Worklog generation over ingested commits
//!
//! Date mode renders one section per (day, branch), rolls the rendered days
//! up into ISO weeks and the rendered weeks up into months. Branch mode
//! renders a summary per branch followed by its days. Weeks and months are
//! always built from their whole span, whatever range was requested. Every
//! unit goes through [`WorklogCache`], so a re-run with unchanged history
//! makes no generation calls.

/// Grouping and plain markdown rendering
pub mod assemble;
/// Signature-checked entry cache
pub mod cache;
/// Content signatures
pub mod signature;


pub use cache::WorklogCache;
pub use signature::content_signature;

use crate::config::WorklogConfig;
use crate::error::WorklogError;
use crate::llm::prompts::{self, CodebaseContext};
use crate::llm::{ChatMessage, LanguageModelClient, with_timeout};
use crate::store::{Codebase, CommitRecord, EntryType, GroupBy, Store};
use assemble::Totals;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summarizer identity used when no language model is injected
pub const PLAIN_SUMMARIZER: &str = "plain";

/// Rendered worklog plus cache accounting for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorklogOutput {
    pub markdown: String,
    /// Units produced by a generation call this run
    pub generated: usize,
    /// Units served from the cache
    pub cached: usize,
    pub commit_count: usize,
    pub duration_ms: u64,
}

impl WorklogOutput {
    fn record(&mut self, was_cached: bool) {
        if was_cached {
            self.cached += 1;
        } else {
            self.generated += 1;
        }
    }
}

/// Produces worklogs for one profile, reusing cached units where possible
pub struct WorklogGenerator {
    store: Arc<Store>,
    llm: Option<Arc<dyn LanguageModelClient>>,
    config: WorklogConfig,
    profile: String,
    today: Option<NaiveDate>,
}

impl WorklogGenerator {
    /// Without an `llm`, every unit is rendered as a plain commit list
    pub fn new(
        store: Arc<Store>,
        config: WorklogConfig,
        profile: &str,
        llm: Option<Arc<dyn LanguageModelClient>>,
    ) -> Self {
        Self {
            store,
            llm,
            config,
            profile: profile.to_string(),
            today: None,
        }
    }

    /// Override the date that is never served from cache
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Identity folded into every signature
    pub fn summarizer(&self) -> String {
        if let Some(name) = self.config.summarizer.as_deref().filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        match &self.llm {
            Some(llm) => llm.model_name().to_string(),
            None => PLAIN_SUMMARIZER.to_string(),
        }
    }

    fn cache_for(&self, codebase: &Codebase) -> WorklogCache {
        let cache = WorklogCache::new(
            self.store.clone(),
            codebase.id,
            &self.profile,
            &self.summarizer(),
        );
        match self.today {
            Some(today) => cache.with_today(today),
            None => cache,
        }
    }

    /// Render the worklog for the inclusive local date range `start..=end`
    pub async fn generate(
        &self,
        codebase: &Codebase,
        start: NaiveDate,
        end: NaiveDate,
        group_by: GroupBy,
    ) -> Result<WorklogOutput, WorklogError> {
        let started = Instant::now();
        if end < start {
            return Err(WorklogError::other(format!(
                "Worklog range ends ({}) before it starts ({})",
                end, start
            )));
        }

        // Date mode loads the full span of every touched week and month so
        // rollups never depend on where the requested range happens to cut
        let (load_start, load_end) = match group_by {
            GroupBy::Date => assemble::rollup_span(start, end),
            GroupBy::Branch => (start, end),
        };
        let (from_ts, to_ts) = assemble::range_bounds(load_start, load_end);
        let commits = self.store.commits_in_range(
            codebase.id,
            from_ts,
            to_ts,
            self.config.only_user_commits,
        )?;
        let branch_names: HashMap<i64, String> = self
            .store
            .list_branches(codebase.id)?
            .into_iter()
            .map(|b| (b.id, b.name))
            .collect();
        let in_range = commits
            .iter()
            .filter(|c| (start..=end).contains(&assemble::local_date(c.timestamp)))
            .count();

        tracing::info!(
            "Generating {} worklog for {} ({} to {}, {} commits, summarizer {})",
            group_by,
            codebase.name,
            start,
            end,
            in_range,
            self.summarizer()
        );

        let mut output = WorklogOutput {
            commit_count: in_range,
            ..Default::default()
        };

        let mut markdown = String::new();
        let _ = writeln!(
            markdown,
            "# {} worklog: {} to {}\n",
            codebase.name, start, end
        );

        if in_range == 0 {
            markdown.push_str("No commits in this period.\n");
        } else {
            let context = CodebaseContext {
                name: codebase.name.clone(),
                summary: codebase.summary.clone(),
            };
            let cache = self.cache_for(codebase);
            let body = match group_by {
                GroupBy::Date => {
                    self.by_date(
                        &cache,
                        &context,
                        (start, end),
                        &commits,
                        &branch_names,
                        &mut output,
                    )
                    .await?
                }
                GroupBy::Branch => {
                    self.by_branch(&cache, &context, start, &commits, &branch_names, &mut output)
                        .await?
                }
            };
            markdown.push_str(&body);
        }

        output.markdown = markdown.trim_end().to_string() + "\n";
        output.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Worklog ready: {} generated, {} cached in {}ms",
            output.generated,
            output.cached,
            output.duration_ms
        );
        Ok(output)
    }

    async fn by_date(
        &self,
        cache: &WorklogCache,
        context: &CodebaseContext,
        (start, end): (NaiveDate, NaiveDate),
        commits: &[CommitRecord],
        branch_names: &HashMap<i64, String>,
        output: &mut WorklogOutput,
    ) -> Result<String, WorklogError> {
        let days = assemble::by_day(commits);
        let shown_days: Vec<NaiveDate> = days
            .keys()
            .copied()
            .filter(|d| (start..=end).contains(d))
            .collect();
        let shown_weeks: BTreeSet<NaiveDate> =
            shown_days.iter().map(|d| assemble::week_start(*d)).collect();
        let shown_months: BTreeSet<NaiveDate> =
            shown_days.iter().map(|d| assemble::month_start(*d)).collect();

        let mut weeks: BTreeMap<NaiveDate, Vec<NaiveDate>> = BTreeMap::new();
        for date in days.keys() {
            weeks.entry(assemble::week_start(*date)).or_default().push(*date);
        }

        // A month consumes every week with at least one day in the month
        let mut months: BTreeMap<NaiveDate, Vec<NaiveDate>> = BTreeMap::new();
        for (monday, dates) in &weeks {
            for date in dates {
                let first = assemble::month_start(*date);
                if !shown_months.contains(&first) {
                    continue;
                }
                let entry = months.entry(first).or_default();
                if !entry.contains(monday) {
                    entry.push(*monday);
                }
            }
        }

        let needed_weeks: BTreeSet<NaiveDate> = shown_weeks
            .iter()
            .chain(months.values().flatten())
            .copied()
            .collect();
        weeks.retain(|monday, _| needed_weeks.contains(monday));

        // Day sections, one per branch active that day
        let mut rendered_days: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for date in weeks.values().flatten() {
            let mut sections = Vec::new();
            for (branch_id, branch_commits) in assemble::by_branch(days[date].iter().copied()) {
                let name = branch_label(branch_id, branch_names);
                let (content, was_cached) = cache
                    .get_cached_or_generate(
                        *date,
                        branch_id,
                        Some(name.as_str()),
                        EntryType::DayUpdates,
                        GroupBy::Date,
                        &branch_commits,
                        || self.day_content(context, *date, Some(name.as_str()), &branch_commits),
                    )
                    .await?;
                output.record(was_cached);
                sections.push((name, content));
            }
            rendered_days.insert(*date, assemble::render_sections(4, &sections));
        }

        // Weeks consume the rendered days
        let mut rendered_weeks: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for (monday, dates) in &weeks {
            let week_commits: Vec<&CommitRecord> = dates
                .iter()
                .flat_map(|d| days[d].iter().copied())
                .collect();
            let sections: Vec<(String, String)> = dates
                .iter()
                .map(|d| (d.to_string(), rendered_days[d].clone()))
                .collect();
            let breakdown: Vec<(String, Totals)> = dates
                .iter()
                .map(|d| (d.to_string(), Totals::of(days[d].iter().copied())))
                .collect();
            let period = format!("week of {}", monday);

            let (content, was_cached) = cache
                .get_cached_or_generate(
                    *monday,
                    None,
                    None,
                    EntryType::WeekSummary,
                    GroupBy::Date,
                    &week_commits,
                    || self.rollup_content(context, &period, &sections, &breakdown),
                )
                .await?;
            output.record(was_cached);
            rendered_weeks.insert(*monday, content);
        }

        // Months consume the rendered weeks, so they are signed over every
        // commit behind those weeks, including days of a neighbouring month
        let mut month_sections = Vec::new();
        for (first, mondays) in &months {
            let month_commits: Vec<&CommitRecord> = mondays
                .iter()
                .flat_map(|m| weeks[m].iter())
                .flat_map(|d| days[d].iter().copied())
                .collect();
            let sections: Vec<(String, String)> = mondays
                .iter()
                .map(|m| (format!("Week of {}", m), rendered_weeks[m].clone()))
                .collect();
            let breakdown: Vec<(String, Totals)> = mondays
                .iter()
                .map(|m| {
                    let in_month = weeks[m]
                        .iter()
                        .filter(|d| assemble::month_start(**d) == *first)
                        .flat_map(|d| days[d].iter().copied());
                    (format!("Week of {}", m), Totals::of(in_month))
                })
                .collect();
            let period = month_label(*first);

            let (content, was_cached) = cache
                .get_cached_or_generate(
                    *first,
                    None,
                    None,
                    EntryType::MonthSummary,
                    GroupBy::Date,
                    &month_commits,
                    || self.rollup_content(context, &period, &sections, &breakdown),
                )
                .await?;
            output.record(was_cached);
            month_sections.push((period, content));
        }

        let mut out = assemble::render_sections(2, &month_sections);
        out.push_str("\n\n");
        for monday in &shown_weeks {
            let _ = writeln!(
                out,
                "## Week of {}\n\n{}\n",
                monday,
                rendered_weeks[monday].trim_end()
            );
            let day_sections: Vec<(String, String)> = shown_days
                .iter()
                .filter(|d| assemble::week_start(**d) == *monday)
                .map(|d| (d.to_string(), rendered_days[d].clone()))
                .collect();
            let _ = writeln!(out, "{}\n", assemble::render_sections(3, &day_sections));
        }
        Ok(out)
    }

    async fn by_branch(
        &self,
        cache: &WorklogCache,
        context: &CodebaseContext,
        start: NaiveDate,
        commits: &[CommitRecord],
        branch_names: &HashMap<i64, String>,
        output: &mut WorklogOutput,
    ) -> Result<String, WorklogError> {
        let mut out = String::new();
        for (branch_id, branch_commits) in assemble::by_branch(commits) {
            let name = branch_label(branch_id, branch_names);

            let (summary, was_cached) = cache
                .get_cached_or_generate(
                    start,
                    branch_id,
                    Some(name.as_str()),
                    EntryType::BranchSummary,
                    GroupBy::Branch,
                    &branch_commits,
                    || self.branch_content(context, &name, &branch_commits),
                )
                .await?;
            output.record(was_cached);

            let mut day_sections = Vec::new();
            for (date, day_commits) in assemble::by_day(branch_commits.iter().copied()) {
                let (content, was_cached) = cache
                    .get_cached_or_generate(
                        date,
                        branch_id,
                        Some(name.as_str()),
                        EntryType::DayUpdates,
                        GroupBy::Branch,
                        &day_commits,
                        || self.day_content(context, date, Some(name.as_str()), &day_commits),
                    )
                    .await?;
                output.record(was_cached);
                day_sections.push((date.to_string(), content));
            }

            let _ = writeln!(
                out,
                "## {}\n\n{}\n\n{}\n",
                name,
                summary.trim_end(),
                assemble::render_sections(3, &day_sections)
            );
        }
        Ok(out)
    }

    async fn summarize(
        &self,
        llm: &Arc<dyn LanguageModelClient>,
        target: &str,
        timeout_secs: u64,
        messages: Vec<ChatMessage>,
    ) -> Result<String, WorklogError> {
        let text = with_timeout(
            target,
            Duration::from_secs(timeout_secs),
            llm.chat_complete(&messages),
        )
        .await?;
        Ok(text)
    }

    async fn day_content(
        &self,
        context: &CodebaseContext,
        date: NaiveDate,
        branch: Option<&str>,
        commits: &[&CommitRecord],
    ) -> Result<String, WorklogError> {
        match &self.llm {
            Some(llm) => {
                let target = match branch {
                    Some(branch) => format!("day {} [{}]", date, branch),
                    None => format!("day {}", date),
                };
                let messages = prompts::day_section(context, date, branch, commits);
                self.summarize(llm, &target, self.config.summary_timeout_secs, messages)
                    .await
            }
            None => Ok(assemble::render_commit_list(commits)),
        }
    }

    async fn branch_content(
        &self,
        context: &CodebaseContext,
        branch: &str,
        commits: &[&CommitRecord],
    ) -> Result<String, WorklogError> {
        match &self.llm {
            Some(llm) => {
                let messages = prompts::branch_summary(context, branch, commits);
                self.summarize(
                    llm,
                    &format!("branch {}", branch),
                    self.config.branch_summary_timeout_secs,
                    messages,
                )
                .await
            }
            None => {
                let totals = Totals::of(commits.iter().copied());
                let first = commits.iter().map(|c| c.timestamp).min().unwrap_or_default();
                let last = commits.iter().map(|c| c.timestamp).max().unwrap_or_default();
                Ok(format!(
                    "{} from {} to {}",
                    describe_totals(&totals),
                    assemble::local_date(first),
                    assemble::local_date(last)
                ))
            }
        }
    }

    async fn rollup_content(
        &self,
        context: &CodebaseContext,
        period: &str,
        sections: &[(String, String)],
        breakdown: &[(String, Totals)],
    ) -> Result<String, WorklogError> {
        match &self.llm {
            Some(llm) => {
                let messages = prompts::rollup(context, period, sections);
                self.summarize(llm, period, self.config.summary_timeout_secs, messages)
                    .await
            }
            None => {
                let mut out = String::new();
                for (label, totals) in breakdown {
                    let _ = writeln!(out, "- {}: {}", label, describe_totals(totals));
                }
                Ok(out)
            }
        }
    }
}

fn branch_label(branch_id: Option<i64>, names: &HashMap<i64, String>) -> String {
    branch_id
        .and_then(|id| names.get(&id).cloned())
        .unwrap_or_else(|| "(no branch)".to_string())
}

fn month_label(first: NaiveDate) -> String {
    format!("{} {}", first.format("%B"), first.year())
}

fn describe_totals(totals: &Totals) -> String {
    format!(
        "{} commit{} (+{} -{})",
        totals.commit_count,
        if totals.commit_count == 1 { "" } else { "s" },
        totals.additions,
        totals.deletions
    )
}
