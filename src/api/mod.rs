//! Output interfaces for localization runs

pub mod formatting;

pub use formatting::{
    BearingRecord, CsvFormatter, JsonFormatter, LocalizationReport, OutputFormat, TextFormatter,
};
