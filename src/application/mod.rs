pub mod use_cases;

pub use use_cases::data_import::DataImportUseCase;
pub use use_cases::text_to_sql::{TextToSqlSettings, TextToSqlUseCase};
