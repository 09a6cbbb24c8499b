// Heuristics for turning model output into a structured analysis.
//
// Models are asked for JSON but do not always comply: answers arrive wrapped
// in Markdown fences, with prose before or after the object, or as plain
// prose with headings and bullet lists. Parsing tries progressively looser
// strategies and never fails; fields it cannot find stay empty.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::warn;

use aiact_core::domain::RiskLevel;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAnalysis {
    pub risk_level: Option<RiskLevel>,
    pub confidence: Option<f64>,
    pub categories: Vec<String>,
    pub reasoning: Option<String>,
    pub obligations: Vec<String>,
    pub recommendations: Vec<String>,
}

const LEVEL_KEYS: &[&str] = &[
    "risk_level",
    "riskLevel",
    "risk_category",
    "riskCategory",
    "risk_tier",
    "classification",
    "risk",
];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "confidence_score", "confidenceScore"];
const CATEGORY_KEYS: &[&str] = &[
    "categories",
    "riskCategories",
    "risk_categories",
    "matched_categories",
    "annex_iii_categories",
];
const REASONING_KEYS: &[&str] = &["reasoning", "justification", "explanation", "rationale", "summary"];
const OBLIGATION_KEYS: &[&str] = &[
    "obligations",
    "requirements",
    "compliance_requirements",
    "complianceRequirements",
];
const RECOMMENDATION_KEYS: &[&str] = &["recommendations", "next_steps", "nextSteps"];

/// Patterns for the prose fallback, compiled once.
struct TextPatterns {
    bullet: Regex,
    number: Regex,
    level_label: Regex,
    confidence_label: Regex,
    reasoning_label: Regex,
    tier: Regex,
}

impl TextPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            bullet: Regex::new(r"^(?:[-*•]|\d+[.)])\s+(.+)$")?,
            number: Regex::new(r"(\d+(?:\.\d+)?)\s*(%)?")?,
            level_label: Regex::new(
                r"(?i)\b(?:risk[\s_-]+level|risk[\s_-]+category|classification)\b[^:]*:[\s*_]*(.+)",
            )?,
            confidence_label: Regex::new(r"(?i)\bconfidence\b\D*?(\d+(?:\.\d+)?)\s*(%)?")?,
            reasoning_label: Regex::new(r"(?i)^(?:reasoning|justification|rationale)\b[^:]*:[\s*_]*(.+)")?,
            // high/limited/transparency/minimal/low/no are ordinary prose
            // words, so they only count with "risk" attached.
            tier: Regex::new(
                r"(?i)\b(?:(unacceptable|prohibited|banned)|(high|limited|transparency|minimal|low|no)[\s_-]+risk)\b",
            )?,
        })
    }
}

fn patterns() -> Option<&'static TextPatterns> {
    static PATTERNS: OnceLock<Option<TextPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match TextPatterns::compile() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("response patterns failed to compile: {e}");
                None
            }
        })
        .as_ref()
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Find a JSON object in `text`: the whole text, then each fenced code
/// block, then the first balanced `{...}` span that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(block.trim()) {
            return Some(v);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_object_end(&trimmed[start..]) {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&trimmed[start..start + end]) {
                return Some(v);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Contents of every ``` fenced block; the language tag line is dropped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string (e.g. `json`) up to the end of the line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Byte length of the object starting at `s[0] == '{'`, honouring string
/// literals and escapes. `None` if the braces never balance.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Analysis parsing
// ---------------------------------------------------------------------------

/// Parse a model answer. JSON wins when present; otherwise labelled lines
/// and bulleted sections are read from the prose.
pub fn parse_analysis(text: &str) -> ParsedAnalysis {
    match extract_json(text) {
        Some(Value::Object(map)) => from_json(&map),
        _ => from_text(text),
    }
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

fn from_json(map: &Map<String, Value>) -> ParsedAnalysis {
    let risk_level = first(map, LEVEL_KEYS).and_then(|v| match v {
        Value::String(s) => RiskLevel::parse_loose(s),
        Value::Object(o) => o
            .get("level")
            .or_else(|| o.get("name"))
            .and_then(Value::as_str)
            .and_then(RiskLevel::parse_loose),
        _ => None,
    });

    let confidence = first(map, CONFIDENCE_KEYS).and_then(|v| match v {
        Value::Number(n) => n.as_f64().map(normalize_confidence),
        Value::String(s) => parse_confidence_text(s),
        _ => None,
    });

    ParsedAnalysis {
        risk_level,
        confidence,
        categories: first(map, CATEGORY_KEYS).map(string_list).unwrap_or_default(),
        reasoning: first(map, REASONING_KEYS)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        obligations: first(map, OBLIGATION_KEYS).map(string_list).unwrap_or_default(),
        recommendations: first(map, RECOMMENDATION_KEYS)
            .map(string_list)
            .unwrap_or_default(),
    }
}

/// Accept an array of strings, an array of objects or a single string.
/// Objects are rendered as `article: title` when both are present.
fn string_list(v: &Value) -> Vec<String> {
    let item = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => {
                let get = |k: &str| o.get(k).and_then(Value::as_str).map(str::trim);
                let label = get("title")
                    .or_else(|| get("name"))
                    .or_else(|| get("description"))
                    .or_else(|| get("text"))?;
                match get("article") {
                    Some(article) => Some(format!("{article}: {label}")),
                    None => Some(label.to_string()),
                }
            }
            _ => None,
        }
    };
    match v {
        Value::Array(items) => items.iter().filter_map(item).filter(|s| !s.is_empty()).collect(),
        other => item(other).filter(|s| !s.is_empty()).into_iter().collect(),
    }
}

fn normalize_confidence(x: f64) -> f64 {
    let x = if x > 1.0 { x / 100.0 } else { x };
    x.clamp(0.0, 1.0)
}

/// First number in `s`; a trailing `%` or a value above 1 is a percentage.
fn parse_confidence_text(s: &str) -> Option<f64> {
    confidence_from(&patterns()?.number.captures(s)?)
}

/// Reads capture 1 as the number and capture 2 as an optional `%`.
fn confidence_from(caps: &Captures<'_>) -> Option<f64> {
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(if caps.get(2).is_some() {
        (number / 100.0).clamp(0.0, 1.0)
    } else {
        normalize_confidence(number)
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Obligations,
    Recommendations,
}

fn from_text(text: &str) -> ParsedAnalysis {
    let mut out = ParsedAnalysis::default();
    let Some(p) = patterns() else {
        return out;
    };
    let mut section = Section::None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(item) = bullet_item(p, line) {
            match section {
                Section::Obligations => out.obligations.push(item.to_string()),
                Section::Recommendations => out.recommendations.push(item.to_string()),
                Section::None => {
                    read_labels(p, &mut out, item);
                }
            }
            continue;
        }

        if read_labels(p, &mut out, line) {
            continue;
        }

        let plain = strip_emphasis(line);
        let lower = plain.to_lowercase();
        if lower.contains("obligation") || lower.contains("requirement") {
            section = Section::Obligations;
        } else if lower.contains("recommendation") || lower.contains("next step") {
            section = Section::Recommendations;
        } else if plain.ends_with(':') || line.starts_with('#') {
            section = Section::None;
        }
    }

    if out.risk_level.is_none() {
        out.risk_level = level_mentioned_in(p, text);
    }
    out
}

fn strip_emphasis(line: &str) -> &str {
    line.trim_matches(|c: char| c == '#' || c == '*' || c == '_').trim()
}

/// Fill still-empty level, confidence and reasoning fields from a labelled
/// line. Returns true if the line supplied any of them.
fn read_labels(p: &TextPatterns, out: &mut ParsedAnalysis, line: &str) -> bool {
    let plain = strip_emphasis(line);
    let mut found = false;

    if out.risk_level.is_none() {
        let level = p
            .level_label
            .captures(plain)
            .and_then(|c| c.get(1))
            .and_then(|m| RiskLevel::parse_loose(m.as_str()));
        if level.is_some() {
            out.risk_level = level;
            found = true;
        }
    }
    if out.confidence.is_none() {
        if let Some(c) = p.confidence_label.captures(plain).and_then(|c| confidence_from(&c)) {
            out.confidence = Some(c);
            found = true;
        }
    }
    if out.reasoning.is_none() {
        if let Some(m) = p.reasoning_label.captures(plain).and_then(|c| c.get(1)) {
            let reasoning = m.as_str().trim();
            if !reasoning.is_empty() {
                out.reasoning = Some(reasoning.to_string());
                found = true;
            }
        }
    }
    found
}

/// Strip a bullet marker (`-`, `*`, `•`, `1.`, `1)`) and return the item.
fn bullet_item<'a>(p: &TextPatterns, line: &'a str) -> Option<&'a str> {
    p.bullet
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Earliest tier phrase in free text. Words that are common in ordinary
/// prose only count with "risk" attached ("low risk", "high-risk").
fn level_mentioned_in(p: &TextPatterns, text: &str) -> Option<RiskLevel> {
    p.tier.captures_iter(text).find_map(|c| {
        if c.get(1).is_some() {
            return Some(RiskLevel::Unacceptable);
        }
        let word = c.get(2)?.as_str();
        if word.eq_ignore_ascii_case("no") {
            Some(RiskLevel::Minimal)
        } else {
            RiskLevel::parse_loose(word)
        }
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
