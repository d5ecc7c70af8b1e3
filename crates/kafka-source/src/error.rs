use kafka_types::RecordError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid topic pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("No topics match pattern '{0}'")]
    NoMatchingTopics(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Fatal record error: {0}")]
    FatalRecord(RecordError),

    #[error("Checkpoint error: {0:#}")]
    Checkpoint(#[source] anyhow::Error),

    #[error("Sink error: {0:#}")]
    Sink(#[source] anyhow::Error),
}

/// Coarse classification of [`Error`] for callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The run was misconfigured; retrying will not help.
    Configuration,
    /// The broker could not be reached or queried; safe to retry.
    Transport,
    /// The broker reported a fatal per-record error.
    Fatal,
    /// Persisted state could not be read or written.
    Checkpoint,
    /// The downstream sink rejected a batch or failed to flush.
    Sink,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_) | Error::InvalidPattern(_) | Error::NoMatchingTopics(_) => {
                ErrorKind::Configuration
            }
            Error::Kafka(_) => ErrorKind::Transport,
            Error::FatalRecord(_) => ErrorKind::Fatal,
            Error::Checkpoint(_) => ErrorKind::Checkpoint,
            Error::Sink(_) => ErrorKind::Sink,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            Error::InvalidConfig("both".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::NoMatchingTopics("^x$".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::Kafka("down".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            Error::FatalRecord(RecordError::fatal("Fatal", "boom")).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            Error::Checkpoint(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Checkpoint
        );
        assert_eq!(
            Error::Sink(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Sink
        );
    }
}
