//! Conventional-commit classification of commit subjects

use crate::models::CommitDetail;
use regex::Regex;
use std::sync::OnceLock;

/// Recognized conventional-commit types
pub const COMMIT_TYPES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore", "revert",
];

fn conventional_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^({})(\(.+\))?: .+$", COMMIT_TYPES.join("|")))
            .expect("valid regex")
    })
}

/// Whether a message's first line follows `type(scope): description`
pub fn is_conventional(message: &str) -> bool {
    let subject = message.lines().next().unwrap_or("");
    conventional_pattern().is_match(subject)
}

/// Share of `commits` that are conventional; `None` for an empty slice
pub fn conventional_ratio(commits: &[CommitDetail]) -> Option<f64> {
    if commits.is_empty() {
        return None;
    }
    let hits = commits.iter().filter(|c| is_conventional(&c.message)).count();
    Some(hits as f64 / commits.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> CommitDetail {
        CommitDetail {
            sha: "0".repeat(40),
            author: "a".into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_conventional_subjects() {
        assert!(is_conventional("feat: add login"));
        assert!(is_conventional("fix(parser): handle EOF\n\nbody text"));
        assert!(is_conventional("revert: feat: add login"));
        assert!(!is_conventional("Add login"));
        assert!(!is_conventional("feat:missing space"));
        assert!(!is_conventional("feature: not a type"));
        assert!(!is_conventional("fix(): empty scope"));
        assert!(!is_conventional("Merge branch 'main'\n\nfeat: x"));
        assert!(!is_conventional(""));
    }

    #[test]
    fn test_ratio() {
        assert_eq!(conventional_ratio(&[]), None);
        let commits = vec![
            commit("feat: a"),
            commit("fix: b"),
            commit("random"),
            commit("docs: c"),
        ];
        assert_eq!(conventional_ratio(&commits), Some(0.75));
    }
}
