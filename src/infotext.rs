use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

// ── Lazy static regexes ──────────────────────────────────────────────────────

/// One `Key: value` pair of the settings line; values may be quoted.
static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s*([\w ]+):\s*("(?:\\.|[^\\"])*"|[^,]*)(?:,|$)"#).unwrap());

const NEGATIVE_PROMPT_PREFIX: &str = "Negative prompt:";

/// A line needs at least this many pairs to count as a settings line;
/// fewer and it is treated as part of the prompt.
const MIN_SETTINGS_PAIRS: usize = 3;

// ── Parsed generation parameters ─────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct GenerationParameters {
    pub prompt: String,
    pub negative_prompt: String,
    /// Settings-line pairs, raw string values keyed by their label.
    pub settings: BTreeMap<String, String>,
}

impl GenerationParameters {
    /// Seed from the settings line. Coerced through float first, matching
    /// how the UI round-trips the value.
    pub fn seed(&self) -> Option<i64> {
        self.settings
            .get("Seed")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|f| f as i64)
    }
}

// ── Infotext parsing ─────────────────────────────────────────────────────────

/// Parse a generation-parameters text blob: prompt lines, an optional
/// `Negative prompt:` section, and a trailing settings line of
/// comma-separated `Key: value` pairs.
pub fn parse_generation_parameters(text: &str) -> GenerationParameters {
    let mut lines: Vec<&str> = text.lines().collect();

    let mut settings_line = "";
    if let Some(last) = lines.last().copied() {
        if PARAM_RE.captures_iter(last).count() >= MIN_SETTINGS_PAIRS {
            settings_line = last;
            lines.pop();
        }
    }

    let mut prompt = String::new();
    let mut negative_prompt = String::new();
    let mut in_negative = false;

    for line in lines {
        let mut line = line.trim();
        if let Some(rest) = line.strip_prefix(NEGATIVE_PROMPT_PREFIX) {
            in_negative = true;
            line = rest.trim_start();
        }
        let target = if in_negative {
            &mut negative_prompt
        } else {
            &mut prompt
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(line);
    }

    let mut settings = BTreeMap::new();
    for cap in PARAM_RE.captures_iter(settings_line) {
        let key = cap[1].trim().to_string();
        let value = unquote(cap[2].trim());
        if !key.is_empty() {
            settings.insert(key, value);
        }
    }

    GenerationParameters {
        prompt,
        negative_prompt,
        settings,
    }
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        serde_json::from_str::<String>(value)
            .unwrap_or_else(|_| value[1..value.len() - 1].to_string())
    } else {
        value.to_string()
    }
}

// ── Prompt modification ──────────────────────────────────────────────────────

/// Remove and append comma-separated terms. Standard words are matched on
/// word boundaries; anything else (tags like `<lora:name:1>`) is matched
/// literally. Each removal term is applied once, trying interior, leading,
/// trailing, and whole-string positions in order.
pub fn modify_prompt(original: &str, remove: &str, add: &str) -> String {
    let mut prompt = original.to_string();

    for term in remove.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let escaped = regex::escape(term);
        let standard = term.chars().next().is_some_and(char::is_alphanumeric)
            && term.chars().last().is_some_and(char::is_alphanumeric);
        let pattern = if standard {
            format!(r"\b{}\b", escaped)
        } else {
            escaped
        };

        let stages = [
            (format!(r"(?i),\s*{}\s*,", pattern), ","),
            (format!(r"(?i)^\s*{}\s*,", pattern), ""),
            (format!(r"(?i),\s*{}\s*$", pattern), ""),
            (format!(r"(?i)\s+{}\s*$", pattern), ""),
            (format!(r"(?i)^\s*{}\s*$", pattern), ""),
        ];
        for (stage, replacement) in stages {
            let Ok(re) = Regex::new(&stage) else { continue };
            let replaced = re.replacen(&prompt, 1, replacement);
            if replaced != prompt {
                prompt = replaced.into_owned();
                break;
            }
        }
    }

    let mut prompt = prompt
        .trim_matches(|c| c == ' ' || c == ',')
        .to_string();

    let additions: Vec<&str> = add.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
    if !additions.is_empty() {
        let add_part = additions.join(", ");
        prompt = if prompt.is_empty() {
            add_part
        } else {
            format!("{}, {}", prompt, add_part)
        };
    }

    prompt
}
