// ============================================================
// CSV PARSER
// ============================================================
// Read CSV files into staged tables with encoding and delimiter detection

use crate::domain::dataset::StagedTable;
use crate::domain::error::{AppError, Result};
use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use std::path::Path;
use tracing::debug;

/// CSV reader producing one `StagedTable` per file
pub struct CsvParser {
    /// Delimiter character, detected from the content when unset
    delimiter: Option<u8>,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: None }
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Read a CSV file into a table named `table_name`
    pub fn parse_file(&self, path: &Path, table_name: &str) -> Result<StagedTable> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        let content = decode_bytes(&bytes);
        self.parse_content(&content, table_name)
    }

    /// Parse CSV content from string
    pub fn parse_content(&self, content: &str, table_name: &str) -> Result<StagedTable> {
        if content.trim().is_empty() {
            return Err(AppError::ValidationError(
                "File is empty or contains no data".to_string(),
            ));
        }

        let delimiter = self
            .delimiter
            .unwrap_or_else(|| Self::detect_delimiter(content));
        debug!("Parsing CSV with delimiter {:?}", delimiter as char);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::ParseError(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse CSV row {}: {}", index + 1, e))
            })?;
            rows.push(record.iter().map(|value| Some(value.to_string())).collect());
        }

        StagedTable::from_raw(table_name, &headers, rows)
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];
        let sample_lines: Vec<&str> = content.lines().take(10).collect();

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        if sample_lines.is_empty() {
            return best_delimiter;
        }

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());

            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}

/// UTF-8 (optionally with BOM), falling back to Windows-1252 for legacy exports
fn decode_bytes(bytes: &[u8]) -> String {
    let without_bom = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(without_bom) {
        Ok(content) => content.to_string(),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(without_bom);
            decoded.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let content = "Name,Age,City\nAlice,30,NYC\nBob,25,LA";
        let table = CsvParser::new().parse_content(content, "data").unwrap();

        assert_eq!(table.name, "data");
        assert_eq!(table.columns, vec!["name", "age", "city"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0].as_deref(), Some("Alice"));
    }

    #[test]
    fn test_parse_semicolon_csv() {
        let content = "a;b\n1;2\n3;4\n";
        let table = CsvParser::new().parse_content(content, "data").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[1][1].as_deref(), Some("4"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(CsvParser::detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(CsvParser::detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(CsvParser::detect_delimiter("a\tb\nc\td"), b'\t');
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let result = CsvParser::new().parse_content("  \n", "data");
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_headers_only_is_rejected() {
        let result = CsvParser::new().parse_content("a,b\n", "data");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "Café" encoded as Windows-1252
        let bytes = [b'C', b'a', b'f', 0xE9];
        assert_eq!(decode_bytes(&bytes), "Café");
        assert_eq!(decode_bytes(&[0xEF, 0xBB, 0xBF, b'x']), "x");
    }
}
