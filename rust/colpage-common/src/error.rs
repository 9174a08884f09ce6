use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Fewer bytes (or bits) are available than the encoded stream declares.
    pub fn truncated(element: impl Into<String>, needed: usize, available: usize) -> Error {
        Error(
            ErrorKind::Truncated {
                element: element.into(),
                needed,
                available,
            }
            .into(),
        )
    }

    /// The encoded stream contains a value that cannot be valid for its position.
    pub fn invalid_value(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidValue {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn count_mismatch(expected: usize, actual: usize) -> Error {
        Error(ErrorKind::CountMismatch { expected, actual }.into())
    }

    pub fn overflow(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::Overflow {
                context: context.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::NotImplemented {
                message: message.into(),
            }
            .into(),
        )
    }

    /// Returns `true` when the error was caused by corrupt or short page data,
    /// as opposed to misuse of an encoder or decoder by the caller.
    pub fn is_corrupt_data(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Truncated { .. }
                | ErrorKind::InvalidValue { .. }
                | ErrorKind::CountMismatch { .. }
                | ErrorKind::Overflow { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("truncated input for '{element}': needed {needed}, available {available}")]
    Truncated {
        element: String,
        needed: usize,
        available: usize,
    },

    #[error("invalid value for '{element}': {message}")]
    InvalidValue { element: String, message: String },

    #[error("number of values read ({actual}) does not match the expected count ({expected})")]
    CountMismatch { expected: usize, actual: usize },

    #[error("overflow: {context}")]
    Overflow { context: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("not yet implemented: {message}")]
    NotImplemented { message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(e: std::num::TryFromIntError) -> Self {
        Error::overflow(e.to_string())
    }
}
