//! Input error types

use std::fmt;

use contracts::ContractError;
use statestore::StoreError;
use thiserror::Error;

/// Error returned by source-type implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stateful input errors
#[derive(Debug, Error)]
pub enum InputError {
    /// Sources could not be resolved from configuration
    #[error("input configuration error: {message}")]
    Configuration { message: String },

    /// One or more sources failed `test`
    #[error("input tests failed: {errors}")]
    Validation { errors: ErrorList },

    /// A source-type implementation returned a fatal error
    #[error("source '{source_name}' failed: {source}")]
    SourceFailed {
        source_name: String,
        #[source]
        source: BoxError,
    },

    /// A worker panicked
    #[error("input panic with: {message}\n{backtrace}")]
    Panic {
        source_name: String,
        message: String,
        backtrace: String,
    },

    /// At least one worker of the input failed
    #[error("input {input_id} failed: {errors}")]
    RunFailed { input_id: String, errors: ErrorList },

    #[error("input cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] ContractError),

    /// Checkpoint (de)serialization failed
    #[error("cursor encoding error: {0}")]
    Cursor(#[from] serde_json::Error),

    #[error("invalid input state: {message}")]
    InvalidState { message: String },
}

impl InputError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn source_failed(source_name: impl Into<String>, source: BoxError) -> Self {
        Self::SourceFailed {
            source_name: source_name.into(),
            source,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true if this error only reports cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Store(e) => e.is_cancelled(),
            Self::Pipeline(ContractError::PublishCancelled) => true,
            Self::SourceFailed { source, .. } => source
                .downcast_ref::<InputError>()
                .is_some_and(InputError::is_cancelled),
            _ => false,
        }
    }
}

/// Several errors reported together
///
/// Displays each member on its own line.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<InputError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: InputError) {
        self.0.push(error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InputError> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<InputError> {
        self.0
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl FromIterator<InputError> for ErrorList {
    fn from_iter<T: IntoIterator<Item = InputError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a InputError;
    type IntoIter = std::slice::Iter<'a, InputError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Input Result type alias
pub type Result<T> = std::result::Result<T, InputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_joins_with_newlines() {
        let errors: ErrorList = vec![
            InputError::configuration("a"),
            InputError::invalid_state("b"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            errors.to_string(),
            "input configuration error: a\ninvalid input state: b"
        );

        let err = InputError::RunFailed {
            input_id: "logs".to_string(),
            errors,
        };
        assert!(err.to_string().starts_with("input logs failed: "));
    }

    #[test]
    fn test_cancellation_is_detected_through_wrapping() {
        let wrapped = InputError::source_failed("a", Box::new(InputError::Cancelled));
        assert!(wrapped.is_cancelled());

        let store = InputError::from(StoreError::Cancelled {
            key: "k".to_string(),
        });
        assert!(store.is_cancelled());

        let real = InputError::source_failed("a", "disk on fire".into());
        assert!(!real.is_cancelled());
    }
}
