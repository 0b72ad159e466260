use std::io;
use thiserror::Error;

/// Unified error type for all sqlogs operations.
///
/// The enum spans every failure mode in the workspace, from rejected SQL
/// constructs in the translator to transport failures in the HTTP client.
/// Variants are grouped by the HTTP-style status code they map to; use
/// [`Error::status_code`] when surfacing an error over an HTTP boundary.
///
/// Translation never recovers internally: the first error aborts the
/// translation and propagates to the caller unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// The SQL is valid but uses a construct the translator does not handle
    /// (recursive CTEs, non-ALL set operations, DISTINCT aggregates,
    /// non-equi JOIN predicates, unsupported functions, ...).
    #[error("{0}")]
    Unsupported(String),

    /// The SQL is semantically or lexically invalid for translation: a
    /// column missing from GROUP BY, a duplicate alias, an alias containing
    /// characters outside the bare literal class, a non-numeric LIMIT.
    #[error("{0}")]
    Invalid(String),

    /// A referenced table or view is not configured. The message carries the
    /// list of available tables as a hint.
    #[error("{0}")]
    NotFound(String),

    /// The upstream log backend could not be reached, or answered with a
    /// non-2xx status. Raised only by the HTTP client, never the translator.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// The SQL text could not be parsed at all.
    #[error("failed to parse SQL: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),

    /// I/O failure while loading store configuration from disk.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store configuration file was read but could not be interpreted.
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl Error {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unsupported(_) | Error::Invalid(_) | Error::Parse(_) | Error::Config(_) => 400,
            Error::NotFound(_) => 404,
            Error::Gateway(_) => 502,
            Error::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_category() {
        assert_eq!(Error::Unsupported("x".into()).status_code(), 400);
        assert_eq!(Error::Invalid("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Gateway("x".into()).status_code(), 502);
        assert_eq!(Error::Config("x".into()).status_code(), 400);
    }

    #[test]
    fn messages_pass_through_unchanged() {
        let err = Error::NotFound("table \"logs\" is not configured".into());
        assert_eq!(format!("{err}"), "table \"logs\" is not configured");
    }
}
