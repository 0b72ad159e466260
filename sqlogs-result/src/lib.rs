//! Error types and result definitions for the sqlogs workspace.
//!
//! This crate provides a unified error type ([`Error`]) and result type alias
//! ([`Result<T>`]) used throughout all sqlogs crates. All operations that can
//! fail return `Result<T>`, and errors propagate naturally with the `?`
//! operator across crate boundaries.
//!
//! Every error maps to an HTTP-style status code through
//! [`Error::status_code`], matching the contract expected by callers that
//! surface translator failures over HTTP: `400` for malformed or unsupported
//! SQL, `404` for unresolved tables and views, `502` for upstream transport
//! failures.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
