use pathtree_core::error::{Error, ErrorKind};
use std::fmt;

/// Wraps any redb failure as an `Engine` error.
pub fn from_redb_error<E: fmt::Display>(err: E) -> Error {
	Error::new(ErrorKind::Engine, err.to_string())
}

// vim: ts=4
