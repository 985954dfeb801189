//! Playground share links for reproductions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::form_urlencoded::byte_serialize;

/// Build a link that opens `source` in the playground.
///
/// The source goes in `c=` as URL-safe base64, the first emitter (if any)
/// percent-encoded in `e=`, and compiler options (if any) as base64 JSON in `options=`.
/// Distinct sources always give distinct links.
pub fn playground_link(
    base_url: &str,
    source: &str,
    emitters: &[String],
    compiler_options: Option<&serde_json::Value>,
) -> String {
    let mut link = format!(
        "{}?c={}",
        base_url.trim_end_matches('/'),
        URL_SAFE_NO_PAD.encode(source.as_bytes())
    );

    if let Some(emitter) = emitters.iter().find(|e| !e.trim().is_empty()) {
        link.push_str("&e=");
        link.extend(byte_serialize(emitter.trim().as_bytes()));
    }

    if let Some(options) = compiler_options.filter(|o| !is_empty_options(o)) {
        link.push_str("&options=");
        link.push_str(&URL_SAFE_NO_PAD.encode(options.to_string().as_bytes()));
    }

    link
}

fn is_empty_options(options: &serde_json::Value) -> bool {
    match options {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://typespec.io/playground";

    #[test]
    fn test_source_only() {
        let link = playground_link(BASE, "model A {}", &[], None);
        assert_eq!(
            link,
            format!("{BASE}?c={}", URL_SAFE_NO_PAD.encode("model A {}"))
        );
        assert!(!link.ends_with('='));
    }

    #[test]
    fn test_emitter_and_options() {
        let options = json!({"omit-unreachable-types": true});
        let link = playground_link(
            &format!("{BASE}/"),
            "op ping(): void;",
            &["@typespec/openapi3".to_string(), "@typespec/json-schema".to_string()],
            Some(&options),
        );

        assert!(link.starts_with(&format!("{BASE}?c=")));
        assert!(link.contains("&e=%40typespec%2Fopenapi3&options="));
        assert!(!link.contains("json-schema"));

        let encoded = link.split("&options=").nth(1).unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_empty_options_are_omitted() {
        let link = playground_link(BASE, "x", &[String::new()], Some(&json!({})));
        assert!(!link.contains("&e="));
        assert!(!link.contains("options"));
    }

    #[test]
    fn test_emitter_cannot_break_out_of_its_parameter() {
        let link = playground_link(BASE, "x", &["@acme/a&c=evil#frag".to_string()], None);

        let query = link.split_once('?').unwrap().1;
        assert!(!link.contains('#'));
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("e".to_string(), "@acme/a&c=evil#frag".to_string()));
    }

    #[test]
    fn test_distinct_sources_distinct_links() {
        let a = playground_link(BASE, "model A {}", &[], None);
        let b = playground_link(BASE, "model B {}", &[], None);
        assert_ne!(a, b);
    }
}
