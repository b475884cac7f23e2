use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;

use crate::error::{Error, ErrorKind};

/// Every byte outside unreserved ASCII gets percent-escaped. `/` falls in
/// here too, which is what lets us join escaped segments with `/` and still
/// parse them back unambiguously.
const SEGMENT_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// An ordered sequence of non-empty segments addressing an entity in the
/// store. The empty sequence denotes the root container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<String>);

impl Path {
	/// The root path (the empty segment sequence).
	pub fn root() -> Self {
		Path(Vec::new())
	}

	pub fn from_segments<I, S>(segments: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Path(segments.into_iter().map(Into::into).collect())
	}

	pub fn segments(&self) -> &[String] {
		&self.0
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The last segment, or `None` for the root.
	pub fn last_segment(&self) -> Option<&str> {
		self.0.last().map(String::as_str)
	}

	/// The path made of every segment except the last one — the parent's
	/// path. Returns the root for a single-segment path.
	pub fn parent(&self) -> Path {
		if self.0.is_empty() {
			return Path::root();
		}
		Path(self.0[..self.0.len() - 1].to_vec())
	}

	/// Builds a new Path with additional segments appended. Never aliases
	/// the receiver's storage.
	pub fn append<I, S>(&self, segments: I) -> Path
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut v = self.0.clone();
		v.extend(segments.into_iter().map(Into::into));
		Path(v)
	}

	pub fn is_prefix_of(&self, other: &Path) -> bool {
		if self.0.len() > other.0.len() {
			return false;
		}
		self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
	}

	pub fn to_matcher(&self) -> crate::matcher::Matcher {
		crate::matcher::Matcher::from_exact(&self.0)
	}

	/// Parses the canonical wire form: segments joined by `/`, each
	/// percent-escaped. Leading, trailing and duplicate `/` are tolerated —
	/// empty segments are simply dropped.
	pub fn parse(s: &str) -> Result<Path, Error> {
		let mut segments = Vec::new();
		for (idx, part) in s.split('/').enumerate() {
			if part.is_empty() {
				continue;
			}
			let decoded = Self::decode_segment(part).map_err(|e| {
				Error::new(ErrorKind::Protocol, format!("while unescaping segment at position {idx}: {e}"))
			})?;
			segments.push(decoded);
		}
		Ok(Path(segments))
	}

	/// Unescapes one percent-escaped wire segment back to its raw form. A
	/// storage adapter that keys on [`Self::to_string`]'s escaped bytes (as
	/// `pathtree-store`'s flat redb table does) needs this to recover the
	/// true segment — and its true sort order — from a scanned key.
	pub fn decode_segment(escaped: &str) -> Result<String, Error> {
		percent_decode_str(escaped)
			.decode_utf8()
			.map(std::borrow::Cow::into_owned)
			.map_err(|e| Error::new(ErrorKind::Protocol, e.to_string()))
	}
}

impl fmt::Display for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for segment in &self.0 {
			if !first {
				write!(f, "/")?;
			}
			first = false;
			write!(f, "{}", utf8_percent_encode(segment, SEGMENT_ESCAPE))?;
		}
		Ok(())
	}
}

impl From<Vec<String>> for Path {
	fn from(v: Vec<String>) -> Self {
		Path(v)
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let p = Path::from_segments(["a b", "c/d", "e%f"]);
		let s = p.to_string();
		assert_eq!(Path::parse(&s).unwrap(), p);
	}

	#[test]
	fn parse_tolerates_extra_slashes() {
		let p = Path::parse("//a//b/").unwrap();
		assert_eq!(p, Path::from_segments(["a", "b"]));
	}

	#[test]
	fn root_parses_to_empty() {
		assert_eq!(Path::parse("").unwrap(), Path::root());
		assert_eq!(Path::parse("/").unwrap(), Path::root());
	}

	#[test]
	fn append_does_not_alias() {
		let p = Path::from_segments(["a"]);
		let q = p.append(["b"]);
		assert_eq!(p, Path::from_segments(["a"]));
		assert_eq!(q, Path::from_segments(["a", "b"]));
	}

	#[test]
	fn is_prefix_of() {
		let a = Path::from_segments(["a"]);
		let ab = Path::from_segments(["a", "b"]);
		assert!(a.is_prefix_of(&ab));
		assert!(!ab.is_prefix_of(&a));
		assert!(Path::root().is_prefix_of(&ab));
	}
}

// vim: ts=4
