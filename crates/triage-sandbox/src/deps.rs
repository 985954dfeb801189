//! Dependency detection from import declarations.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::SandboxConfig;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:"([^"\r\n]+)"|'([^'\r\n]+)')\s*;"#).expect("import pattern is valid")
});

/// Scoped packages referenced by `import "@scope/pkg";` declarations.
///
/// Order of first appearance is kept and duplicates are dropped. Relative
/// and unscoped imports are ignored, and subpath imports collapse to their
/// package (`@scope/pkg/testing` -> `@scope/pkg`).
pub fn detect_dependencies(source: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for caps in IMPORT_RE.captures_iter(source) {
        let Some(spec) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let Some(package) = package_name(spec.as_str().trim()) else {
            continue;
        };
        if !found.iter().any(|p| p == package) {
            found.push(package.to_string());
        }
    }

    found
}

fn package_name(spec: &str) -> Option<&str> {
    if !spec.starts_with('@') {
        return None;
    }
    let mut parts = spec.splitn(3, '/');
    let scope = parts.next()?;
    let name = parts.next().filter(|n| !n.is_empty())?;
    if scope.len() < 2 {
        return None;
    }
    Some(&spec[..scope.len() + 1 + name.len()])
}

/// Minimal `package.json` for a sandbox: the baseline compiler, every
/// detected package, and the emitter if one was requested.
pub fn manifest(config: &SandboxConfig, detected: &[String], emitter: Option<&str>) -> Value {
    let mut deps = Map::new();
    let names = std::iter::once(config.baseline_dependency.as_str())
        .chain(detected.iter().map(String::as_str))
        .chain(emitter);
    for name in names {
        deps.entry(name.to_string())
            .or_insert_with(|| Value::String(config.dependency_version.clone()));
    }

    json!({
        "name": "triage-sandbox",
        "version": "0.0.0",
        "private": true,
        "type": "module",
        "dependencies": deps,
    })
}
