use super::ChatMessage;
use crate::store::{CommitRecord, FileChangeRecord};
use chrono::NaiveDate;
use std::fmt::Write;

const SYSTEM_PROMPT: &str = "You write concise engineering worklogs from git history. \
Describe what changed and why in plain language. Do not invent work that the input does not show.";

/// Project description handed to the model alongside commit details
#[derive(Debug, Clone, Default)]
pub struct CodebaseContext {
    pub name: String,
    pub summary: Option<String>,
}

fn push_context(out: &mut String, context: &CodebaseContext) {
    let _ = writeln!(out, "Project: {}", context.name);
    if let Some(summary) = context.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "About the project: {}", summary.trim());
    }
    out.push('\n');
}

/// Prompt for the one-paragraph summary of a single commit
pub fn commit_summary(
    context: &CodebaseContext,
    message: &str,
    files: &[FileChangeRecord],
    patch_excerpt: &str,
) -> String {
    let mut prompt = String::new();
    push_context(&mut prompt, context);

    prompt.push_str("Summarize this commit in one short paragraph.\n\n");
    let _ = writeln!(prompt, "Commit message:\n{}\n", message.trim());

    prompt.push_str("Files changed:\n");
    for file in files {
        let _ = writeln!(
            prompt,
            "- {} ({}, +{} -{})",
            file.path,
            file.change_type.as_str(),
            file.additions,
            file.deletions
        );
    }

    if !patch_excerpt.is_empty() {
        let _ = write!(prompt, "\nDiff:\n{}\n", patch_excerpt);
    }
    prompt
}

fn commit_line(out: &mut String, commit: &CommitRecord) {
    let _ = write!(
        out,
        "- {} {} (+{} -{})",
        commit.short_hash(),
        commit.subject(),
        commit.stats.additions,
        commit.stats.deletions
    );
    if let Some(summary) = commit.summary.as_deref() {
        let _ = write!(out, ": {}", summary);
    }
    out.push('\n');
}

/// Chat request for one day's section, optionally scoped to a branch
pub fn day_section(
    context: &CodebaseContext,
    date: NaiveDate,
    branch: Option<&str>,
    commits: &[&CommitRecord],
) -> Vec<ChatMessage> {
    let mut body = String::new();
    push_context(&mut body, context);

    match branch {
        Some(branch) => {
            let _ = writeln!(body, "Work on branch {} during {}:", branch, date);
        }
        None => {
            let _ = writeln!(body, "Work during {}:", date);
        }
    }
    for commit in commits {
        commit_line(&mut body, commit);
    }
    body.push_str("\nWrite a short markdown bullet list of what was accomplished.");

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(body)]
}

/// Chat request summarizing everything done on one branch
pub fn branch_summary(
    context: &CodebaseContext,
    branch: &str,
    commits: &[&CommitRecord],
) -> Vec<ChatMessage> {
    let mut body = String::new();
    push_context(&mut body, context);

    let _ = writeln!(body, "Commits on branch {}:", branch);
    for commit in commits {
        commit_line(&mut body, commit);
    }
    body.push_str("\nDescribe the purpose and overall progress of this branch in two or three sentences.");

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(body)]
}

/// Chat request rolling rendered sections up into a higher-level summary
///
/// `period` names the span (for example "week of 2024-03-04"); each section is
/// `(label, rendered markdown)`.
pub fn rollup(
    context: &CodebaseContext,
    period: &str,
    sections: &[(String, String)],
) -> Vec<ChatMessage> {
    let mut body = String::new();
    push_context(&mut body, context);

    let _ = writeln!(body, "Worklog sections for the {}:\n", period);
    for (label, content) in sections {
        let _ = writeln!(body, "### {}\n{}\n", label, content.trim());
    }
    let _ = write!(
        body,
        "Summarize the {} as a few markdown bullets covering the main themes.",
        period
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(body)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeType, CommitStats};

    fn record(hash: &str, message: &str, summary: Option<&str>) -> CommitRecord {
        CommitRecord {
            codebase_id: 1,
            hash: hash.to_string(),
            branch_id: None,
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            message: message.to_string(),
            summary: summary.map(str::to_string),
            timestamp: 0,
            stats: CommitStats {
                additions: 5,
                deletions: 2,
                files_changed: 1,
            },
            is_user_commit: true,
            is_on_default_branch: true,
        }
    }

    #[test]
    fn test_commit_summary_lists_files_and_context() {
        let context = CodebaseContext {
            name: "parser".to_string(),
            summary: Some("An expression parser".to_string()),
        };
        let files = vec![FileChangeRecord {
            path: "src/lex.rs".to_string(),
            change_type: ChangeType::Modify,
            additions: 3,
            deletions: 1,
            diff: None,
        }];
        let prompt = commit_summary(&context, "Fix lexer\n", &files, "+let x = 1;");
        assert!(prompt.contains("Project: parser"));
        assert!(prompt.contains("An expression parser"));
        assert!(prompt.contains("- src/lex.rs (modify, +3 -1)"));
        assert!(prompt.contains("+let x = 1;"));
    }

    #[test]
    fn test_day_section_mentions_branch_and_summaries() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let commit = record("abcdef123", "Add cache\n\nbody", Some("Added a cache"));
        let messages = day_section(&CodebaseContext::default(), date, Some("feature/x"), &[&commit]);
        assert_eq!(messages.len(), 2);
        let body = &messages[1].content;
        assert!(body.contains("branch feature/x during 2024-03-04"));
        assert!(body.contains("- abcdef1 Add cache (+5 -2): Added a cache"));
    }

    #[test]
    fn test_rollup_includes_every_section() {
        let sections = vec![
            ("2024-03-04".to_string(), "- did a".to_string()),
            ("2024-03-05".to_string(), "- did b".to_string()),
        ];
        let messages = rollup(&CodebaseContext::default(), "week of 2024-03-04", &sections);
        let body = &messages[1].content;
        assert!(body.contains("### 2024-03-04\n- did a"));
        assert!(body.contains("### 2024-03-05\n- did b"));
    }
}
