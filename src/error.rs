use thiserror::Error;

/// Errors raised by the engine.
///
/// Data-quality problems (bad dates, unparseable amounts, unknown categories)
/// never show up here; they are skipped, flagged or bucketed instead. These
/// variants mark contract violations and collaborator failures.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Unknown record family '{0}': expected Encounter, Payment or Expense")]
    UnknownFamily(String),

    #[error("Unknown view selection '{0}'")]
    UnknownView(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid expense draft: {0}")]
    InvalidDraft(String),

    #[error("Source '{source_name}' could not be fetched: {details}")]
    SourceUnavailable {
        source_name: String,
        details: String,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
