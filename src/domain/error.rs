//! Domain error types.

/// Top-level error type for rsitrader.
#[derive(Debug, thiserror::Error)]
pub enum RsitraderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

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

    #[error("malformed price data: {reason}")]
    DataParse { reason: String },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RsitraderError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RsitraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_missing(section: &str, key: &str) -> Self {
        RsitraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn data_parse(reason: impl Into<String>) -> Self {
        RsitraderError::DataParse {
            reason: reason.into(),
        }
    }

    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            RsitraderError::Io(_) => 1,
            RsitraderError::ConfigParse { .. }
            | RsitraderError::ConfigMissing { .. }
            | RsitraderError::ConfigInvalid { .. } => 2,
            RsitraderError::Database { .. } | RsitraderError::DatabaseQuery { .. } => 3,
            RsitraderError::DataParse { .. } | RsitraderError::InsufficientData { .. } => 5,
        }
    }
}

impl From<&RsitraderError> for std::process::ExitCode {
    fn from(err: &RsitraderError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
