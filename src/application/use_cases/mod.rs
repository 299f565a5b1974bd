pub mod data_import;
pub mod prompt_builder;
pub mod query_validator;
pub mod sql_generator;
pub mod text_to_sql;
