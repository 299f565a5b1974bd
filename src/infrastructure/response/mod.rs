use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<reasoning>[\s\S]*?</reasoning>").unwrap());

static UNCLOSED_THINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<think>[\s\S]*$").unwrap());

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips reasoning artifacts some models wrap around their answer.
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").to_string();

    // a truncated response can leave a dangling <think> with no answer after it
    if UNCLOSED_THINK_PATTERN.is_match(&cleaned) {
        return String::new();
    }

    let cleaned = cleaned.replace("\r\n", "\n");
    MULTIPLE_NEWLINES_PATTERN
        .replace_all(cleaned.trim(), "\n\n")
        .to_string()
}
