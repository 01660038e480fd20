/// Errors from rule-config validation.
///
/// Every variant carries a field-specific message suitable for returning
/// directly to the config author.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// The config document could not be decoded at all.
    #[error("{0}")]
    Decode(String),

    /// A required field is absent.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// A field is present but its value is invalid.
    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl ValidationError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
