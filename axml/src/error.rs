//! The error type shared by every decoder in the crate.

use thiserror::Error;

/// Errors produced while decoding, encoding or rendering AXML.
#[derive(Error, Debug)]
pub enum AxmlError {
    /// The source ran out of bytes part way through a read or skip.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The caller passed an index or width outside of the allowed range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was invoked before the state it relies on exists,
    /// e.g. reading attributes from a parser that is not on a start tag.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error(transparent)]
    Io(std::io::Error),

    #[error("failed to write XML: {0}")]
    Render(#[from] xml::writer::Error),
}

impl From<std::io::Error> for AxmlError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEndOfInput,
            _ => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AxmlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_unexpected_end() {
        let err: AxmlError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, AxmlError::UnexpectedEndOfInput));

        let err: AxmlError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, AxmlError::Io(_)));
    }
}
