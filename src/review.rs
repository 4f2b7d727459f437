//! File-level review checks and verdict reduction.
//!
//! Everything here is pure: the pipeline feeds in changed files (and the
//! outcome of the AI call) and gets back findings, each destined to become
//! one review comment.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Files whose diff changes more lines than this get a size warning.
/// The threshold is exclusive: exactly this many changes is fine.
pub const LARGE_DIFF_THRESHOLD: u64 = 300;

const LARGE_DIFF_COMMENT: &str =
    "⚠️ This file has a large number of changes. Consider splitting it into smaller pull requests.";
const TODO_COMMENT: &str =
    "⚠️ Found TODO comments in the code. Please ensure these are addressed before merging.";
const AI_REVIEW_PREFIX: &str = "🤖 AI Code Review:";
const AI_REVIEW_FAILED_COMMENT: &str =
    "⚠️ Error getting AI code review. Please try again later.";

/// One entry from the GitHub "list pull request files" endpoint.
///
/// `patch` is absent for binary files and for changes GitHub does not render
/// as a diff (e.g. very large files).
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub changes: u64,
    pub patch: Option<String>,
}

/// A single observation about one file, posted as one review comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: String,
    pub position: u64,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
}

impl ReviewVerdict {
    /// A review requests changes iff at least one finding was produced.
    pub fn from_findings(findings: &[Finding]) -> Self {
        if findings.is_empty() {
            ReviewVerdict::Approve
        } else {
            ReviewVerdict::RequestChanges
        }
    }

    /// The review event name expected by the GitHub reviews endpoint.
    pub fn event(&self) -> &'static str {
        match self {
            ReviewVerdict::Approve => "APPROVE",
            ReviewVerdict::RequestChanges => "REQUEST_CHANGES",
        }
    }

    /// The summary body attached to the review submission.
    pub fn summary(&self) -> &'static str {
        match self {
            ReviewVerdict::Approve => "Code review completed. No issues found! 👍",
            ReviewVerdict::RequestChanges => {
                "Code review completed. Please address the following comments:"
            }
        }
    }
}

/// Whether any checks should run for this file at all. Files without diff
/// text (binary or metadata-only changes) are skipped entirely.
pub fn has_reviewable_diff(file: &ChangedFile) -> bool {
    file.patch.as_deref().map(|p| !p.is_empty()).unwrap_or(false)
}

/// Where a finding's comment is anchored within the file's diff.
///
/// The checks never locate the exact offending line, so every comment anchors
/// to the first position of the patch. Replacing this with real diff-line
/// mapping only requires changing this one function.
pub fn anchor_position(_file: &ChangedFile) -> u64 {
    1
}

/// Run the heuristic checks over one file's diff: the size check first, then
/// the TODO check. Files without a reviewable diff produce nothing.
pub fn heuristic_findings(file: &ChangedFile) -> Vec<Finding> {
    let patch = match file.patch.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => return Vec::new(),
    };

    let mut findings = Vec::new();

    if file.changes > LARGE_DIFF_THRESHOLD {
        findings.push(Finding {
            path: file.filename.clone(),
            position: anchor_position(file),
            body: LARGE_DIFF_COMMENT.to_string(),
        });
    }

    // Case-sensitive, and only against the diff text: a TODO that the diff
    // does not touch is not this change's problem.
    if patch.contains("TODO") {
        findings.push(Finding {
            path: file.filename.clone(),
            position: anchor_position(file),
            body: TODO_COMMENT.to_string(),
        });
    }

    findings
}

/// Map the outcome of the AI call for one file to at most one finding.
///
/// A non-empty review is surfaced verbatim under an AI marker, and an empty
/// review means the model had nothing to say. A failed call becomes an
/// explicit finding so it cannot silently turn into an approval.
pub fn ai_finding(file: &ChangedFile, outcome: Result<String>) -> Option<Finding> {
    match outcome {
        Ok(review) => {
            if review.is_empty() {
                return None;
            }
            Some(Finding {
                path: file.filename.clone(),
                position: anchor_position(file),
                body: format!("{}\n\n{}", AI_REVIEW_PREFIX, review),
            })
        }
        Err(_) => Some(Finding {
            path: file.filename.clone(),
            position: anchor_position(file),
            body: AI_REVIEW_FAILED_COMMENT.to_string(),
        }),
    }
}
