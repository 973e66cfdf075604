//! Grouping of commits into days, ISO weeks and months, plus plain markdown rendering

use crate::store::CommitRecord;
use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveTime, TimeZone};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Local calendar day of a Unix timestamp
pub fn local_date(timestamp: i64) -> NaiveDate {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| utc.with_timezone(&Local).date_naive())
        .unwrap_or_default()
}

/// Unix timestamp of local midnight starting `date`
pub fn day_start(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::default());
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

/// `[start, end)` timestamps covering the inclusive local date range
pub fn range_bounds(first: NaiveDate, last: NaiveDate) -> (i64, i64) {
    let after_last = last.succ_opt().unwrap_or(last);
    (day_start(first), day_start(after_last))
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Dates whose commits feed every week and month touched by `start..=end`
///
/// A month consumes each ISO week holding one of its days, so the span runs
/// from the Monday before the first month starts to the Sunday after the last
/// month ends.
pub fn rollup_span(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = week_start(month_start(start));
    let last_monday = week_start(month_end(end));
    let last = last_monday.checked_add_days(Days::new(6)).unwrap_or(last_monday);
    (first, last)
}

/// Commits grouped by a key, in key order, preserving input order within groups
pub fn group_commits<'a, K: Ord>(
    commits: impl IntoIterator<Item = &'a CommitRecord>,
    key: impl Fn(&CommitRecord) -> K,
) -> BTreeMap<K, Vec<&'a CommitRecord>> {
    let mut groups: BTreeMap<K, Vec<&CommitRecord>> = BTreeMap::new();
    for commit in commits {
        groups.entry(key(commit)).or_default().push(commit);
    }
    groups
}

pub fn by_day<'a>(
    commits: impl IntoIterator<Item = &'a CommitRecord>,
) -> BTreeMap<NaiveDate, Vec<&'a CommitRecord>> {
    group_commits(commits, |c| local_date(c.timestamp))
}

pub fn by_branch<'a>(
    commits: impl IntoIterator<Item = &'a CommitRecord>,
) -> BTreeMap<Option<i64>, Vec<&'a CommitRecord>> {
    group_commits(commits, |c| c.branch_id)
}

/// Aggregate counts of a commit set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub commit_count: i64,
    pub additions: i64,
    pub deletions: i64,
}

impl Totals {
    pub fn of<'a>(commits: impl IntoIterator<Item = &'a CommitRecord>) -> Self {
        commits.into_iter().fold(Totals::default(), |mut acc, c| {
            acc.commit_count += 1;
            acc.additions += c.stats.additions as i64;
            acc.deletions += c.stats.deletions as i64;
            acc
        })
    }
}

/// Markdown bullet list of commits, one line each, with summaries indented below
pub fn render_commit_list(commits: &[&CommitRecord]) -> String {
    let mut out = String::new();
    for commit in commits {
        let _ = writeln!(
            out,
            "- `{}` {} (+{} -{})",
            commit.short_hash(),
            commit.subject(),
            commit.stats.additions,
            commit.stats.deletions
        );
        if let Some(summary) = commit.summary.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "  {}", summary);
        }
    }
    out
}

/// Stack labelled sections under headings of the given level
pub fn render_sections(level: usize, sections: &[(String, String)]) -> String {
    let hashes = "#".repeat(level.max(1));
    let mut out = String::new();
    for (label, body) in sections {
        let _ = writeln!(out, "{} {}\n\n{}\n", hashes, label, body.trim_end());
    }
    out.trim_end().to_string()
}
