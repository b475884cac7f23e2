use std::fmt;

/// The coarse category of a failure, per the store's error taxonomy. Callers
/// are expected to branch on this, not on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// The addressed entity (or an ancestor map) does not exist.
	NotFound,
	/// The operation would violate a structural invariant (e.g. creating a
	/// map where a value already lives, or vice versa).
	Conflict,
	/// A replayed transaction-stream observation no longer matches local
	/// state.
	Stale,
	/// A caller-supplied argument violates a documented precondition (e.g.
	/// an out-of-range fill percent).
	Precondition,
	/// A transaction-stream record is malformed or out of sequence.
	Protocol,
	/// The backing storage engine failed for a reason unrelated to the
	/// above categories.
	Engine,
}

/// The error type shared across the workspace.
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	message: String,
}

impl Error {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Error { kind, message: message.into() }
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	pub fn is_not_found(&self) -> bool {
		self.kind == ErrorKind::NotFound
	}

	pub fn is_conflict(&self) -> bool {
		self.kind == ErrorKind::Conflict
	}

	pub fn is_stale(&self) -> bool {
		self.kind == ErrorKind::Stale
	}

	pub fn is_precondition(&self) -> bool {
		self.kind == ErrorKind::Precondition
	}

	pub fn is_protocol(&self) -> bool {
		self.kind == ErrorKind::Protocol
	}

	pub fn is_engine(&self) -> bool {
		self.kind == ErrorKind::Engine
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self.kind {
			ErrorKind::NotFound => "not found",
			ErrorKind::Conflict => "conflict",
			ErrorKind::Stale => "stale",
			ErrorKind::Precondition => "precondition",
			ErrorKind::Protocol => "protocol",
			ErrorKind::Engine => "engine",
		};
		write!(f, "{label}: {}", self.message)
	}
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn predicates_match_kind() {
		let e = Error::new(ErrorKind::NotFound, "no such map");
		assert!(e.is_not_found());
		assert!(!e.is_conflict());
		assert_eq!(e.to_string(), "not found: no such map");
	}
}

// vim: ts=4
