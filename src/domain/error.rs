//! Domain error types.

/// A parse error with position information for rule conditions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Coarse classification used to decide how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Empty or missing price/indicator data. Skip the unit of work.
    DataUnavailable,
    /// Missing columns or parameters. Aborts the affected unit.
    Configuration,
    /// Single-class labels, too few rows, model failures. Skip the unit.
    DegenerateInput,
    /// Ledger read/write failure. Fatal for the invocation.
    Persistence,
}

/// Top-level error type for kabusignal.
#[derive(Debug, thiserror::Error)]
pub enum KabuError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no price data for {code}")]
    NoData { code: String },

    #[error("insufficient data for {code}: have {rows} rows, need {minimum}")]
    InsufficientData {
        code: String,
        rows: usize,
        minimum: usize,
    },

    #[error("missing required columns for {code}: {}", columns.join(", "))]
    MissingColumns { code: String, columns: Vec<String> },

    #[error("training partition for {code} has a single label class")]
    DegenerateTraining { code: String },

    #[error("classifier error: {reason}")]
    Classifier { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("ledger persistence error: {reason}")]
    Persistence { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KabuError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            KabuError::DataSource { .. } | KabuError::NoData { .. } => {
                ErrorCategory::DataUnavailable
            }
            KabuError::ConfigParse { .. }
            | KabuError::ConfigMissing { .. }
            | KabuError::ConfigInvalid { .. }
            | KabuError::MissingColumns { .. }
            | KabuError::RuleParse(_) => ErrorCategory::Configuration,
            KabuError::InsufficientData { .. }
            | KabuError::DegenerateTraining { .. }
            | KabuError::Classifier { .. } => ErrorCategory::DegenerateInput,
            KabuError::Persistence { .. } | KabuError::Io(_) => ErrorCategory::Persistence,
        }
    }

    /// Whether a batch loop may skip the unit that raised this error and continue.
    pub fn is_skippable(&self) -> bool {
        self.category() != ErrorCategory::Persistence
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        KabuError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        KabuError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&KabuError> for std::process::ExitCode {
    fn from(err: &KabuError) -> Self {
        let code: u8 = match err {
            KabuError::Io(_) => 1,
            KabuError::ConfigParse { .. }
            | KabuError::ConfigMissing { .. }
            | KabuError::ConfigInvalid { .. }
            | KabuError::MissingColumns { .. } => 2,
            KabuError::Persistence { .. } => 3,
            KabuError::RuleParse(_) => 4,
            KabuError::DataSource { .. }
            | KabuError::NoData { .. }
            | KabuError::InsufficientData { .. } => 5,
            KabuError::DegenerateTraining { .. } | KabuError::Classifier { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
