//! Task brief rendering.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use triage_core::BacklogItem;

use crate::config::TriageConfig;
use crate::error::PipelineError;

/// Brief used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = r#"# Triage issue #{{number}}: {{title}}

- URL: {{url}}
- Author: {{author}}
- Opened: {{createdAt}}
- Labels: {{labels}}

## Issue body

{{body}}

## Comments

{{comments}}

## Your task

1. Classify the issue as one of: `bug`, `feature-request`, `docs-bug`, `unknown`.
2. Decide the reproduction status: `has-repro`, `missing`, `generated`,
   `unable-to-repro`, or `not-applicable`. If the report describes a bug
   without a reproduction, try to write a minimal one yourself.
3. If you have reproduction code, verify it against the current compiler:

   ```
   {{verifyCommand}} <file-or-source> [--emitter <package>]
   ```

   The command prints a JSON verdict. Record `still-reproduces`, `fixed`,
   or `inconclusive` as the verification outcome.
4. Suggest the area label the issue belongs to and a next action for a
   maintainer.

## Output

Write a single JSON document to `{{resultPath}}` with these fields:
`number`, `title`, `url`, `author`, `createdAt`, `labels`, `category`,
`reproStatus`, `reproSource`, `reproCode`, `emitter`, `compilerOptions`,
`verification`, `compilerOutput`, `suggestedAction`, `reproDescription`,
`suggestedArea`, `model` (use `{{model}}`).

Do not modify any other file.
"#;

/// Per-run values substituted next to the item fields.
#[derive(Debug, Clone)]
pub struct BriefContext {
    pub result_path: PathBuf,
    pub model: String,
    pub verify_command: String,
}

/// Load a template from disk, or the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<String, PipelineError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| PipelineError::Template {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Remove every brief from a previous run and recreate the directory.
pub fn reset_prompts_dir(config: &TriageConfig) -> Result<(), PipelineError> {
    match fs::remove_dir_all(&config.prompts_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(&config.prompts_dir)?;
    debug!(dir = %config.prompts_dir.display(), "Prompts directory reset");
    Ok(())
}

/// Render an item's brief and write it to its prompt file.
pub fn write_brief(
    config: &TriageConfig,
    template: &str,
    item: &BacklogItem,
) -> Result<PathBuf, PipelineError> {
    let ctx = BriefContext {
        result_path: config.cache().path(item.number),
        model: config.model.clone(),
        verify_command: config.verify_command.clone(),
    };
    let path = config.prompt_path(item.number);
    fs::create_dir_all(&config.prompts_dir)?;
    fs::write(&path, render_brief(template, item, &ctx))?;
    Ok(path)
}

/// Fill `{{placeholder}}` markers in a template.
///
/// Substituted text is not scanned again, so an issue body that happens to
/// contain `{{title}}` comes through verbatim. Unknown placeholders are left
/// as they are.
pub fn render_brief(template: &str, item: &BacklogItem, ctx: &BriefContext) -> String {
    let mut out = String::with_capacity(template.len() + item.body.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };

        let key = &after[..close];
        match lookup(key.trim(), item, ctx) {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("{{");
                out.push_str(key);
                out.push_str("}}");
            }
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

fn lookup(key: &str, item: &BacklogItem, ctx: &BriefContext) -> Option<String> {
    let value = match key {
        "number" => item.number.to_string(),
        "title" => item.title.clone(),
        "url" => item.url.clone(),
        "author" => item.author.clone(),
        "createdAt" => item.created_at.to_rfc3339(),
        "labels" if item.labels.is_empty() => "(none)".to_string(),
        "labels" => item.labels.join(", "),
        "body" if item.body.trim().is_empty() => "(empty)".to_string(),
        "body" => item.body.clone(),
        "comments" => render_comments(&item.comments),
        "resultPath" => ctx.result_path.display().to_string(),
        "model" => ctx.model.clone(),
        "verifyCommand" => ctx.verify_command.clone(),
        _ => return None,
    };
    Some(value)
}

fn render_comments(comments: &[String]) -> String {
    if comments.is_empty() {
        return "(no comments)".to_string();
    }
    comments
        .iter()
        .enumerate()
        .map(|(i, body)| format!("### Comment {}\n\n{}", i + 1, body.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
