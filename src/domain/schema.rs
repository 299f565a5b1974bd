use serde::{Deserialize, Serialize};
use std::fmt;

/// A single column as declared in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type, `ANY` when the table declares none.
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Table and column metadata used to ground SQL generation.
///
/// Built once per request and never mutated afterwards, so it can be shared
/// freely between concurrent requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.name.as_str()).collect()
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tables.is_empty() {
            return f.write_str("(no tables)");
        }

        for (idx, table) in self.tables.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "Table: {}", table.name)?;
            if table.columns.is_empty() {
                writeln!(f, "  (No columns found)")?;
            }
            for column in &table.columns {
                let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
                writeln!(
                    f,
                    "  - {} ({}, {})",
                    column.name, column.data_type, nullability
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![TableSchema {
            name: "data".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    data_type: "INTEGER".to_string(),
                    nullable: false,
                },
                ColumnSchema {
                    name: "city".to_string(),
                    data_type: "TEXT".to_string(),
                    nullable: true,
                },
            ],
        }])
    }

    #[test]
    fn test_render_schema() {
        let rendered = sample().to_string();
        assert_eq!(
            rendered,
            "Table: data\n  - id (INTEGER, NOT NULL)\n  - city (TEXT, NULL)\n"
        );
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let schema = sample();
        assert!(schema.table("DATA").is_some());
        assert!(schema.table("missing").is_none());
        assert_eq!(schema.table_names(), vec!["data"]);
    }
}
