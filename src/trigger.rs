//! Decides whether an inbound webhook delivery should start a review.

use crate::webhook::GitHubWebhookPayload;

/// The GitHub event kind that can carry the trigger comment.
pub const ISSUE_COMMENT_EVENT: &str = "issue_comment";

/// The exact comment text (after trimming and lowercasing) that starts a
/// review. No partial or fuzzy matches.
pub const TRIGGER_PHRASE: &str = "code review bot";

/// Everything the review pipeline needs, extracted from a matching delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: u64,
    pub installation_id: u64,
}

pub fn is_trigger_comment(body: &str) -> bool {
    body.to_lowercase().trim() == TRIGGER_PHRASE
}

/// Match a delivery against the trigger rules and extract the review target.
///
/// Returns None for anything that should not start a review: wrong event
/// kind, wrong action, non-matching comment text, a comment on a plain issue
/// rather than a pull request, or a payload missing required fields.
/// Malformed payloads are never an error; the caller acknowledges them like
/// any other ignored event.
pub fn match_trigger(event: &str, payload: &GitHubWebhookPayload) -> Option<ReviewRequest> {
    if event != ISSUE_COMMENT_EVENT {
        return None;
    }

    if payload.action.as_deref() != Some("created") {
        return None;
    }

    let comment = payload.comment.as_ref()?;
    if !is_trigger_comment(comment.body.as_deref()?) {
        return None;
    }

    // Issue comments land on both issues and PRs; only PR comments carry a
    // pull_request link.
    let issue = payload.issue.as_ref()?;
    issue.pull_request.as_ref()?;

    let repository = payload.repository.as_ref()?;

    Some(ReviewRequest {
        repo_owner: repository.owner.as_ref()?.login.clone()?,
        repo_name: repository.name.clone()?,
        pr_number: issue.number?,
        installation_id: payload.installation.as_ref()?.id?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_payload(value: serde_json::Value) -> GitHubWebhookPayload {
        serde_json::from_value(value).expect("test payload should deserialize")
    }

    fn trigger_payload() -> serde_json::Value {
        json!({
            "action": "created",
            "comment": {
                "id": 1,
                "body": "code review bot",
                "user": { "id": 10, "login": "octocat" }
            },
            "issue": {
                "number": 7,
                "pull_request": {
                    "url": "https://api.github.com/repos/acme/widgets/pulls/7"
                }
            },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 99, "login": "acme" }
            },
            "installation": { "id": 12345 }
        })
    }

    #[test]
    fn test_exact_phrase_matches() {
        assert!(is_trigger_comment("code review bot"));
    }

    #[test]
    fn test_phrase_is_normalized_before_comparison() {
        assert!(is_trigger_comment("Code Review Bot "));
        assert!(is_trigger_comment("  CODE REVIEW BOT"));
        assert!(is_trigger_comment("\tcode review bot\n"));
    }

    #[test]
    fn test_partial_and_variant_phrases_do_not_match() {
        assert!(!is_trigger_comment("please run code review bot"));
        assert!(!is_trigger_comment("code-review-bot"));
        assert!(!is_trigger_comment("code review bot please"));
        assert!(!is_trigger_comment(""));
    }

    #[test]
    fn test_matching_delivery_extracts_review_request() {
        let payload = parse_payload(trigger_payload());
        let request = match_trigger(ISSUE_COMMENT_EVENT, &payload)
            .expect("trigger payload should match");

        assert_eq!(
            request,
            ReviewRequest {
                repo_owner: "acme".to_string(),
                repo_name: "widgets".to_string(),
                pr_number: 7,
                installation_id: 12345,
            }
        );
    }

    #[test]
    fn test_wrong_event_kind_does_not_match() {
        let payload = parse_payload(trigger_payload());
        assert_eq!(match_trigger("issues", &payload), None);
        assert_eq!(match_trigger("pull_request", &payload), None);
    }

    #[test]
    fn test_wrong_action_does_not_match() {
        let mut value = trigger_payload();
        value["action"] = json!("edited");
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);
    }

    #[test]
    fn test_non_trigger_comment_does_not_match() {
        let mut value = trigger_payload();
        value["comment"]["body"] = json!("hello bot");
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);
    }

    #[test]
    fn test_plain_issue_comment_does_not_match() {
        let mut value = trigger_payload();
        value["issue"] = json!({ "number": 7 });
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);
    }

    #[test]
    fn test_missing_fields_report_no_match_rather_than_failing() {
        for field in ["installation", "repository", "issue", "comment"] {
            let mut value = trigger_payload();
            value.as_object_mut().unwrap().remove(field);
            let payload = parse_payload(value);
            assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);
        }
    }

    #[test]
    fn test_missing_nested_fields_report_no_match_rather_than_failing() {
        // Absence inside a present object degrades the same way as an
        // absent object.
        let mut value = trigger_payload();
        value["comment"] = json!({ "id": 1 });
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);

        let mut value = trigger_payload();
        value["issue"] = json!({
            "pull_request": { "url": "https://api.github.com/repos/acme/widgets/pulls/7" }
        });
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);

        let mut value = trigger_payload();
        value["repository"] = json!({ "name": "widgets" });
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);

        let mut value = trigger_payload();
        value["installation"] = json!({});
        let payload = parse_payload(value);
        assert_eq!(match_trigger(ISSUE_COMMENT_EVENT, &payload), None);
    }

    #[test]
    fn test_comment_with_only_a_body_still_matches() {
        // GitHub sends far more comment fields than the trigger reads;
        // only the body decides.
        let mut value = trigger_payload();
        value["comment"] = json!({ "body": "code review bot" });
        let payload = parse_payload(value);

        let request = match_trigger(ISSUE_COMMENT_EVENT, &payload)
            .expect("a bare comment body should still match");
        assert_eq!(request.pr_number, 7);
        assert_eq!(request.repo_owner, "acme");
    }
}
