//! Structured outcome of one sandboxed compile attempt.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Verdict returned by the sandbox builder.
///
/// Serialized field names are the `verify-repro` stdout contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub success: bool,

    /// Compiler output on success; stdout followed by stderr on failure.
    pub diagnostics: String,

    pub exit_code: i32,

    /// Files the emitter produced, keyed by path relative to its output
    /// directory. `None` when no emitter was requested.
    pub emitter_output: Option<BTreeMap<String, String>>,
}

impl VerificationVerdict {
    /// A successful compile.
    pub fn success(diagnostics: impl Into<String>) -> Self {
        Self {
            success: true,
            diagnostics: diagnostics.into(),
            exit_code: 0,
            emitter_output: None,
        }
    }

    /// A failed step with the given exit code.
    pub fn failure(exit_code: i32, diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: diagnostics.into(),
            exit_code,
            emitter_output: None,
        }
    }

    /// Attach collected emitter output.
    pub fn with_emitter_output(mut self, files: BTreeMap<String, String>) -> Self {
        self.emitter_output = Some(files);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let verdict = VerificationVerdict::failure(2, "error: unknown identifier");
        let value = serde_json::to_value(&verdict).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["exitCode"], 2);
        assert_eq!(value["diagnostics"], "error: unknown identifier");
        assert!(value["emitterOutput"].is_null());
    }

    #[test]
    fn test_emitter_output_keys_are_sorted() {
        let mut files = BTreeMap::new();
        files.insert("b/openapi.yaml".to_string(), "b".to_string());
        files.insert("a/openapi.yaml".to_string(), "a".to_string());

        let verdict = VerificationVerdict::success("ok").with_emitter_output(files);
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.find("a/openapi.yaml").unwrap() < json.find("b/openapi.yaml").unwrap());
    }
}
