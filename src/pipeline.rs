//! The review flow for one matched delivery: fetch the PR and its changed
//! files, collect findings per file, reduce to a verdict, submit the review.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::review::{self, ReviewVerdict};
use crate::trigger::ReviewRequest;
use crate::AppState;

pub async fn run_review(
    correlation_id: Option<&str>,
    state: &AppState,
    request: &ReviewRequest,
) -> Result<()> {
    info!(
        "Starting code review for PR #{} in {}/{}",
        request.pr_number, request.repo_owner, request.repo_name
    );

    let pr = state
        .github_client
        .get_pull_request(
            correlation_id,
            request.installation_id,
            &request.repo_owner,
            &request.repo_name,
            request.pr_number,
        )
        .await?;

    let files = state
        .github_client
        .list_changed_files(
            correlation_id,
            request.installation_id,
            &request.repo_owner,
            &request.repo_name,
            request.pr_number,
        )
        .await?;

    let mut findings = Vec::new();

    // Files are evaluated in API order so findings come out deterministic:
    // per file, size warning first, then TODO, then the AI review.
    for file in &files {
        if !review::has_reviewable_diff(file) {
            info!("Skipping {} (no diff text)", file.filename);
            continue;
        }

        findings.extend(review::heuristic_findings(file));

        if let Some(openai_client) = &state.openai_client {
            match state
                .github_client
                .get_file_contents(
                    correlation_id,
                    request.installation_id,
                    &request.repo_owner,
                    &request.repo_name,
                    &file.filename,
                    &pr.head.sha,
                )
                .await
            {
                Ok(content) => {
                    let outcome = openai_client
                        .review_file(correlation_id, &file.filename, &content)
                        .await;
                    if let Err(e) = &outcome {
                        error!("AI review failed for {}: {}", file.filename, e);
                    }
                    if let Some(finding) = review::ai_finding(file, outcome) {
                        findings.push(finding);
                    }
                }
                Err(e) => {
                    // Unreadable content (deleted, binary, bad encoding) just
                    // skips the AI check for this file.
                    warn!("Skipping AI review for {}: {}", file.filename, e);
                }
            }
        }
    }

    let verdict = ReviewVerdict::from_findings(&findings);

    state
        .github_client
        .create_review(
            correlation_id,
            request.installation_id,
            &request.repo_owner,
            &request.repo_name,
            request.pr_number,
            verdict,
            &findings,
        )
        .await?;

    info!(
        "Code review for PR #{} finished: {} with {} comments",
        request.pr_number,
        verdict.event(),
        findings.len()
    );

    Ok(())
}
