use crate::error::Error;

/// Result type alias used throughout sqlogs.
///
/// Shorthand for `std::result::Result<T, Error>`; all sqlogs operations that
/// can fail return this type.
pub type Result<T> = std::result::Result<T, Error>;
