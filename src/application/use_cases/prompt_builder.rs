//! Prompt construction for SQL generation and repair.
//!
//! Pure formatting: the same inputs always yield the same prompt.

use crate::domain::schema::SchemaDescriptor;

/// The statement that failed and what went wrong with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairContext {
    pub failed_sql: String,
    /// Engine error text or validator rejection reason, verbatim.
    pub error: String,
}

const OUTPUT_FORMAT: &str = r#"Respond with ONLY a YAML block containing the query:
```yaml
sql: |
  SELECT ...
```"#;

pub struct PromptBuilder {
    dialect: &'static str,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { dialect: "SQLite" }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: &'static str) -> Self {
        Self { dialect }
    }

    pub fn build(
        &self,
        schema: &SchemaDescriptor,
        question: &str,
        repair: Option<&RepairContext>,
    ) -> String {
        match repair {
            None => self.generation_prompt(schema, question),
            Some(context) => self.repair_prompt(schema, question, context),
        }
    }

    fn generation_prompt(&self, schema: &SchemaDescriptor, question: &str) -> String {
        let mut prompt = format!(
            "You are a SQL expert. Convert the following natural language question into a {} SQL query.\n\n",
            self.dialect
        );
        prompt.push_str(&format!("Database Schema:\n{}\n", render_schema(schema)));
        prompt.push_str(&format!("Question: \"{}\"\n\n", question));
        prompt.push_str(&self.rules(&[]));
        prompt.push('\n');
        prompt.push_str(OUTPUT_FORMAT);
        prompt
    }

    fn repair_prompt(
        &self,
        schema: &SchemaDescriptor,
        question: &str,
        context: &RepairContext,
    ) -> String {
        let mut prompt = format!(
            "You are a SQL debugging expert. The following {} query was rejected or failed with an error.\n\n",
            self.dialect
        );
        prompt.push_str(&format!("Original Question: \"{}\"\n\n", question));
        prompt.push_str(&format!("Database Schema:\n{}\n", render_schema(schema)));
        prompt.push_str(&format!(
            "Failed SQL Query:\n```sql\n{}\n```\n\n",
            context.failed_sql.trim()
        ));
        prompt.push_str(&format!("Error Message: \"{}\"\n\n", context.error.trim()));
        prompt.push_str(
            "Analyze the error and write a corrected query that fixes this specific error.\n\n",
        );
        prompt.push_str(&self.rules(&[
            "Fix the specific error mentioned above",
            "Maintain the original intent of the question",
        ]));
        prompt.push('\n');
        prompt.push_str(OUTPUT_FORMAT);
        prompt
    }

    fn rules(&self, extra: &[&str]) -> String {
        let mut rules = vec![
            "Only generate a single SELECT statement (no INSERT, UPDATE, DELETE, DROP, ALTER, ATTACH, PRAGMA)".to_string(),
            format!("Use proper {} syntax and only the tables and columns listed in the schema", self.dialect),
            "Include appropriate JOINs if needed".to_string(),
            "Use meaningful column aliases".to_string(),
            "Handle NULL values appropriately".to_string(),
            "Do not include SQL comments or a trailing semicolon".to_string(),
        ];
        rules.extend(extra.iter().map(|rule| rule.to_string()));

        let mut text = String::from("Rules:\n");
        for (idx, rule) in rules.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", idx + 1, rule));
        }
        text
    }
}

fn render_schema(schema: &SchemaDescriptor) -> String {
    let rendered = schema.to_string();
    if rendered.ends_with('\n') {
        rendered
    } else {
        format!("{}\n", rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{ColumnSchema, TableSchema};

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![TableSchema {
            name: "data".to_string(),
            columns: vec![ColumnSchema {
                name: "city".to_string(),
                data_type: "TEXT".to_string(),
                nullable: true,
            }],
        }])
    }

    #[test]
    fn test_generation_prompt_contents() {
        let prompt = PromptBuilder::new().build(&schema(), "count rows", None);

        assert!(prompt.contains("Table: data"));
        assert!(prompt.contains("  - city (TEXT, NULL)"));
        assert!(prompt.contains("Question: \"count rows\""));
        assert!(prompt.contains("sql: |"));
        assert!(!prompt.contains("Failed SQL Query"));
    }

    #[test]
    fn test_repair_prompt_carries_failed_sql_and_error() {
        let context = RepairContext {
            failed_sql: "SELECT nonexistent_col FROM data".to_string(),
            error: "SQLite error: no such column: nonexistent_col".to_string(),
        };
        let prompt = PromptBuilder::new().build(&schema(), "list cities", Some(&context));

        assert!(prompt.contains("```sql\nSELECT nonexistent_col FROM data\n```"));
        assert!(prompt.contains("Error Message: \"SQLite error: no such column: nonexistent_col\""));
        assert!(prompt.contains("Fix the specific error mentioned above"));
        assert!(prompt.contains("Original Question: \"list cities\""));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.build(&schema(), "q", None),
            builder.build(&schema(), "q", None)
        );
    }

    #[test]
    fn test_dialect_is_named_in_prompts() {
        let builder = PromptBuilder::with_dialect("PostgreSQL");
        let prompt = builder.build(&schema(), "q", None);
        assert!(prompt.contains("into a PostgreSQL SQL query"));
        assert!(prompt.contains("Use proper PostgreSQL syntax"));
        assert!(!prompt.contains("SQLite"));
    }
}
