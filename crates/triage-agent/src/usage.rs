//! Token usage extraction from free-form agent output.

use once_cell::sync::Lazy;
use regex::Regex;
use triage_core::TokenUsage;

const NUM: &str = r"(\d[\d,]*(?:\.\d+)?)([km])?";

fn patterns(label: &str) -> Vec<Regex> {
    [
        // "1,200 input tokens", "12.5k input tokens"
        format!(r"(?i){NUM}\s+{label}\s+tokens\b"),
        // "input_tokens: 1200", "\"input_tokens\": 1200", "input tokens = 1200"
        format!(r#"(?i)\b{label}[_ ]tokens"?\s*[:=]\s*{NUM}"#),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("token pattern is valid"))
    .collect()
}

static INPUT: Lazy<Vec<Regex>> = Lazy::new(|| patterns("input"));
static OUTPUT: Lazy<Vec<Regex>> = Lazy::new(|| patterns("output"));
static TOTAL: Lazy<Vec<Regex>> = Lazy::new(|| patterns("total"));

/// Find token counters in agent output.
///
/// Several label styles are recognized. When a counter is printed more than
/// once, the last occurrence wins, since agents print running totals and end
/// with a summary. A bare total with no breakdown is reported as input.
/// Returns `None` when nothing matches.
pub fn parse_token_usage(output: &str) -> Option<TokenUsage> {
    let input = last_match(&INPUT, output);
    let out = last_match(&OUTPUT, output);

    if input.is_some() || out.is_some() {
        return Some(TokenUsage::new(input.unwrap_or(0), out.unwrap_or(0)));
    }

    last_match(&TOTAL, output).map(|total| TokenUsage::new(total, 0))
}

fn last_match(patterns: &[Regex], text: &str) -> Option<u64> {
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = parse_count(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()))?;
            Some((whole.start(), value))
        })
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, value)| value)
}

fn parse_count(digits: &str, suffix: Option<&str>) -> Option<u64> {
    let base: f64 = digits.replace(',', "").parse().ok()?;
    let scale = match suffix.map(str::to_ascii_lowercase).as_deref() {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        _ => 1.0,
    };
    Some((base * scale).round() as u64)
}
