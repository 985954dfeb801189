//! Suggested maintainer follow-ups.
//!
//! Rules are evaluated in a fixed order over a result's classification,
//! reproduction and verification fields. Each action carries the literal
//! `gh` command that performs it. Free-text `suggestedAction` from the agent
//! is not turned into an action; it stays on the entry as written.

use triage_core::{
    ActionKind, Category, ReproStatus, SuggestedAction, TaskResult, VerificationStatus,
};

use crate::config::TriageConfig;

const ICON_CLOSE: &str = "✅";
const ICON_COMMENT: &str = "💬";
const ICON_LABEL: &str = "🏷️";

const REQUEST_REPRO: &str = "Thanks for the report! Could you share a minimal reproduction, \
ideally as a playground link? That will help us investigate.";

/// Derive follow-up actions for one result.
pub fn suggest_actions(result: &TaskResult, config: &TriageConfig) -> Vec<SuggestedAction> {
    let number = result.number;
    let repo = quote_arg(&config.repo);
    let mut actions = Vec::new();

    if result.verification == Some(VerificationStatus::Fixed) {
        let comment = "This no longer reproduces with the current compiler, closing. \
Feel free to reopen if you still see the problem.";
        actions.push(SuggestedAction {
            label: "Close as fixed".to_string(),
            icon: ICON_CLOSE.to_string(),
            command: format!(
                "gh issue close {number} --repo {repo} --comment {}",
                quote_arg(comment)
            ),
            kind: ActionKind::Close,
        });
    }

    if result.category == Category::Bug && result.repro_status == ReproStatus::Missing {
        actions.push(SuggestedAction {
            label: "Request a reproduction".to_string(),
            icon: ICON_COMMENT.to_string(),
            command: format!(
                "gh issue comment {number} --repo {repo} --body {}",
                quote_arg(REQUEST_REPRO)
            ),
            kind: ActionKind::Comment,
        });
    }

    if result.repro_status == ReproStatus::Generated
        && result.verification == Some(VerificationStatus::StillReproduces)
    {
        if let Some(link) = result.playground_link.as_deref().filter(|l| !l.is_empty()) {
            let body = format!("Here is a minimal reproduction of this issue: {link}");
            actions.push(SuggestedAction {
                label: "Post generated reproduction".to_string(),
                icon: ICON_COMMENT.to_string(),
                command: format!(
                    "gh issue comment {number} --repo {repo} --body {}",
                    quote_arg(&body)
                ),
                kind: ActionKind::Comment,
            });
        }
    }

    let area = result
        .suggested_area
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    if let Some(area) = area.filter(|a| !has_label(result, a)) {
        let mut command = format!(
            "gh issue edit {number} --repo {repo} --add-label {}",
            quote_arg(area)
        );
        for old in result
            .labels
            .iter()
            .filter(|l| config.is_area_label(l) && l.as_str() != area)
        {
            command.push_str(" --remove-label ");
            command.push_str(&quote_arg(old));
        }
        actions.push(SuggestedAction {
            label: format!("Set area to {area}"),
            icon: ICON_LABEL.to_string(),
            command,
            kind: ActionKind::Label,
        });
    }

    if let Some(label) = config.category_label(result.category) {
        if !has_label(result, label) && area != Some(label) {
            actions.push(SuggestedAction {
                label: format!("Add label {label}"),
                icon: ICON_LABEL.to_string(),
                command: format!(
                    "gh issue edit {number} --repo {repo} --add-label {}",
                    quote_arg(label)
                ),
                kind: ActionKind::Label,
            });
        }
    }

    actions
}

fn has_label(result: &TaskResult, label: &str) -> bool {
    result.labels.iter().any(|l| l == label)
}

/// Quote a shell argument unless it is made only of safe characters.
fn quote_arg(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TriageConfig {
        TriageConfig::default()
    }

    fn result(category: Category, repro: ReproStatus) -> TaskResult {
        let mut r = TaskResult::new(42, "title", category, repro);
        r.labels = vec!["bug".to_string()];
        r
    }

    fn kinds(actions: &[SuggestedAction]) -> Vec<ActionKind> {
        actions.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_fixed_suggests_close() {
        let mut r = result(Category::Bug, ReproStatus::HasRepro);
        r.verification = Some(VerificationStatus::Fixed);

        let actions = suggest_actions(&r, &config());
        assert_eq!(kinds(&actions), vec![ActionKind::Close]);
        assert!(actions[0]
            .command
            .starts_with("gh issue close 42 --repo microsoft/typespec --comment '"));
        assert_eq!(actions[0].icon, ICON_CLOSE);
    }

    #[test]
    fn test_missing_repro_requests_one() {
        let r = result(Category::Bug, ReproStatus::Missing);
        let actions = suggest_actions(&r, &config());
        assert_eq!(kinds(&actions), vec![ActionKind::Comment]);
        assert!(actions[0].command.contains("gh issue comment 42"));
        assert!(actions[0].command.contains("minimal reproduction"));
    }

    #[test]
    fn test_generated_repro_posts_link() {
        let mut r = result(Category::Bug, ReproStatus::Generated);
        r.verification = Some(VerificationStatus::StillReproduces);
        r.playground_link = Some("https://typespec.io/playground?c=abc".to_string());

        let actions = suggest_actions(&r, &config());
        assert_eq!(kinds(&actions), vec![ActionKind::Comment]);
        assert!(actions[0]
            .command
            .contains("https://typespec.io/playground?c=abc"));

        r.playground_link = None;
        assert!(suggest_actions(&r, &config()).is_empty());
    }

    #[test]
    fn test_area_change_replaces_old_area() {
        let mut r = result(Category::Bug, ReproStatus::HasRepro);
        r.labels = vec!["bug".to_string(), "compiler:core".to_string()];
        r.suggested_area = Some("emitter:openapi3".to_string());

        let actions = suggest_actions(&r, &config());
        assert_eq!(kinds(&actions), vec![ActionKind::Label]);
        assert_eq!(
            actions[0].command,
            "gh issue edit 42 --repo microsoft/typespec --add-label emitter:openapi3 --remove-label compiler:core"
        );
    }

    #[test]
    fn test_area_already_applied_is_quiet() {
        let mut r = result(Category::Bug, ReproStatus::HasRepro);
        r.labels = vec!["bug".to_string(), "emitter:openapi3".to_string()];
        r.suggested_area = Some("emitter:openapi3".to_string());
        assert!(suggest_actions(&r, &config()).is_empty());
    }

    #[test]
    fn test_missing_category_label() {
        let mut r = result(Category::FeatureRequest, ReproStatus::NotApplicable);
        r.labels.clear();

        let actions = suggest_actions(&r, &config());
        assert_eq!(kinds(&actions), vec![ActionKind::Label]);
        assert!(actions[0].command.ends_with("--add-label feature"));

        let r = result(Category::Unknown, ReproStatus::NotApplicable);
        assert!(suggest_actions(&r, &config()).is_empty());
    }

    #[test]
    fn test_rules_combine_in_order() {
        let mut r = result(Category::Bug, ReproStatus::Missing);
        r.labels.clear();
        r.suggested_area = Some("lib:http".to_string());

        let actions = suggest_actions(&r, &config());
        assert_eq!(
            kinds(&actions),
            vec![ActionKind::Comment, ActionKind::Label, ActionKind::Label]
        );
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("emitter:openapi3"), "emitter:openapi3");
        assert_eq!(quote_arg("needs info"), "'needs info'");
        assert_eq!(quote_arg("it's"), r"'it'\''s'");
    }
}
