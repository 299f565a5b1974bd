// ============================================================
// SPREADSHEET INFRASTRUCTURE LAYER
// ============================================================
// CSV and Excel readers feeding the SQLite import

mod csv_parser;
mod excel_reader;

pub use csv_parser::CsvParser;
pub use excel_reader::{ExcelReader, SINGLE_TABLE_NAME};
