//! SQL Generator
//!
//! Sends a prompt to the language model and isolates one SQL statement from
//! whatever shape the answer comes back in. Each response shape is handled by
//! an independent `ExtractionStrategy`; strategies run in order and the first
//! one that yields a statement wins.
//!
//! Call failures and unusable responses are returned as-is. Retrying is the
//! repair loop's decision, not the generator's.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::clean_llm_response;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

static SQL_KEY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(\s*)sql\s*:(.*)$").unwrap());

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").unwrap());

static UNCLOSED_SQL_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```[ \t]*(?:sql|sqlite)[ \t]*\r?\n(.*)$").unwrap());

static ANSWER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:sql query|corrected sql query|sql|query)\s*:\s*").unwrap());

/// Keywords a raw SQL answer can start with. Non-SELECT statements are still
/// extracted so the validator can reject them with a precise reason.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "PRAGMA",
    "ATTACH", "DETACH", "REPLACE", "EXPLAIN", "VALUES",
];

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, response: &str) -> Option<String>;
}

/// `sql:` key-value text (YAML inline, quoted or block scalar, fenced or not)
/// and JSON objects with an `"sql"` field.
pub struct StructuredFieldStrategy;

impl StructuredFieldStrategy {
    fn from_json(response: &str) -> Option<String> {
        let trimmed = response.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .map(|rest| rest.trim().trim_end_matches("```").trim())
            .unwrap_or(trimmed);

        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("sql")
            .or_else(|| value.get("SQL"))
            .and_then(|sql| sql.as_str())
            .map(str::to_string)
    }

    fn from_yaml(response: &str) -> Option<String> {
        let lines: Vec<&str> = response.lines().collect();

        for (idx, line) in lines.iter().enumerate() {
            let Some(caps) = SQL_KEY_LINE.captures(line) else {
                continue;
            };
            let key_indent = caps.get(1).map(|m| m.as_str().len()).unwrap_or(0);
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

            let continuation = Self::continuation_lines(&lines[idx + 1..], key_indent);

            let value = if rest.starts_with('|') || rest.starts_with('>') {
                let block = dedent(&continuation);
                if rest.starts_with('>') {
                    block.split_whitespace().collect::<Vec<_>>().join(" ")
                } else {
                    block
                }
            } else if rest.starts_with('"') {
                serde_json::from_str::<String>(rest)
                    .unwrap_or_else(|_| rest.trim_matches('"').to_string())
            } else if rest.starts_with('\'') {
                rest.trim_matches('\'').replace("''", "'")
            } else {
                let mut parts = vec![rest.to_string()];
                parts.extend(continuation.iter().map(|l| l.trim().to_string()));
                parts.join("\n")
            };

            // block scalars are unambiguous; a one-line `SQL:` may just be prose
            let is_block = rest.starts_with('|') || rest.starts_with('>');
            if !is_block && leading_statement_keyword(&value).is_none() {
                continue;
            }

            if !value.trim().is_empty() {
                return Some(value);
            }
        }
        None
    }

    /// Lines belonging to the value of a key indented by `key_indent`.
    fn continuation_lines<'a>(lines: &[&'a str], key_indent: usize) -> Vec<&'a str> {
        let mut taken = Vec::new();
        for line in lines {
            if line.trim_start().starts_with("```") {
                break;
            }
            if line.trim().is_empty() {
                taken.push(*line);
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            if indent <= key_indent {
                break;
            }
            taken.push(*line);
        }
        while taken.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
            taken.pop();
        }
        taken
    }
}

impl ExtractionStrategy for StructuredFieldStrategy {
    fn name(&self) -> &'static str {
        "structured_field"
    }

    fn extract(&self, response: &str) -> Option<String> {
        Self::from_json(response).or_else(|| Self::from_yaml(response))
    }
}

/// A ```sql fenced block, or a bare ``` block.
pub struct FencedBlockStrategy;

impl ExtractionStrategy for FencedBlockStrategy {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn extract(&self, response: &str) -> Option<String> {
        let mut bare: Option<String> = None;

        for caps in FENCED_BLOCK.captures_iter(response) {
            let lang = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if body.is_empty() {
                continue;
            }
            match lang.as_str() {
                "sql" | "sqlite" => return Some(body.to_string()),
                "" if bare.is_none() => bare = Some(body.to_string()),
                _ => {}
            }
        }

        bare.or_else(|| {
            // a truncated answer may never close its fence
            UNCLOSED_SQL_FENCE
                .captures(response)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|body| !body.is_empty())
        })
    }
}

/// Unwrapped SQL: everything from the first line that opens with a statement
/// keyword up to the next blank line.
pub struct RawSqlStrategy;

impl ExtractionStrategy for RawSqlStrategy {
    fn name(&self) -> &'static str {
        "raw_sql"
    }

    fn extract(&self, response: &str) -> Option<String> {
        let lines: Vec<String> = response
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .map(|line| ANSWER_LABEL.replace(line.trim_start(), "").to_string())
            .collect();

        let start = lines
            .iter()
            .position(|line| leading_statement_keyword(line).is_some())?;
        let statement: Vec<&str> = lines[start..]
            .iter()
            .take_while(|line| !line.trim().is_empty())
            .map(String::as_str)
            .collect();

        Some(statement.join("\n"))
    }
}

pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(StructuredFieldStrategy),
        Box::new(FencedBlockStrategy),
        Box::new(RawSqlStrategy),
    ]
}

pub struct SqlGenerator {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl SqlGenerator {
    pub fn new(llm_client: Arc<dyn LLMClient + Send + Sync>) -> Self {
        Self::with_strategies(llm_client, default_strategies())
    }

    pub fn with_strategies(
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
    ) -> Self {
        Self {
            llm_client,
            strategies,
        }
    }

    /// One model call, one candidate statement.
    pub async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        let raw = self.llm_client.generate(config, "", prompt).await?;
        self.extract_sql(&raw)
    }

    pub fn extract_sql(&self, response: &str) -> Result<String> {
        let cleaned = clean_llm_response(response);
        if cleaned.is_empty() {
            return Err(AppError::GenerationParseError(
                "model returned an empty response".to_string(),
            ));
        }

        for strategy in &self.strategies {
            if let Some(sql) = strategy.extract(&cleaned).map(|sql| normalize_statement(&sql)) {
                if !sql.is_empty() {
                    debug!(strategy = strategy.name(), "Extracted SQL from LLM response");
                    return Ok(sql);
                }
            }
        }

        Err(AppError::GenerationParseError(format!(
            "no SQL statement found in response: {}",
            preview(&cleaned, 200)
        )))
    }
}

/// The statement keyword `text` opens with. The keyword must be written all
/// upper or all lower case and followed by whitespace, `(`, `*` or the end,
/// so prose such as "With pleasure!" or "Select the rows" is not mistaken
/// for a statement.
fn leading_statement_keyword(text: &str) -> Option<&'static str> {
    let text = text.trim_start();
    let word_len = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (word, rest) = text.split_at(word_len);

    let consistent_case = word == word.to_ascii_uppercase() || word == word.to_ascii_lowercase();
    let boundary = match rest.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || c == '(' || c == '*',
    };
    if word.is_empty() || !consistent_case || !boundary {
        return None;
    }

    STATEMENT_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| keyword.eq_ignore_ascii_case(word))
}

/// Trims whitespace and any trailing statement terminators.
fn normalize_statement(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
