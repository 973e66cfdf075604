//! Matching commit authors against the local developer

use regex::Regex;
use std::sync::OnceLock;

fn noreply_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // Optional numeric id prefix: 12345+user@users.noreply.github.com
            Regex::new(r"(?i)^(?:\d+\+)?([a-z0-9](?:[a-z0-9-]*[a-z0-9])?)@users\.noreply\.github\.com$")
                .ok()
        })
        .as_ref()
}

/// Username encoded in a GitHub no-reply address, if any
pub fn github_noreply_username(email: &str) -> Option<&str> {
    noreply_pattern()?
        .captures(email.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Whether a commit author is the configured local user
///
/// Exact email match, or a GitHub no-reply address whose username equals the
/// configured handle ignoring case.
pub fn is_user_commit(
    author_email: &str,
    user_email: Option<&str>,
    github_handle: Option<&str>,
) -> bool {
    if let Some(email) = user_email
        && !email.is_empty()
        && author_email == email
    {
        return true;
    }

    match (github_handle, github_noreply_username(author_email)) {
        (Some(handle), Some(username)) => {
            let handle = handle.trim().trim_start_matches('@');
            !handle.is_empty() && username.eq_ignore_ascii_case(handle)
        }
        _ => false,
    }
}
