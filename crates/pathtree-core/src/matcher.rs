use crate::path::Path;

/// One element of a compiled [`Matcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum MatchElement {
	Exact(String),
	AnyElement,
	AnySubpath,
}

/// A compiled pattern over [`Path`]s. `AnySubpath` is the only non-greedy
/// element and may occur anywhere; matching it is resolved by trying every
/// remaining suffix of the path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Matcher(Vec<MatchElement>);

impl Matcher {
	pub fn new() -> Self {
		Matcher(Vec::new())
	}

	pub(crate) fn from_exact(segments: &[String]) -> Self {
		Matcher(segments.iter().cloned().map(MatchElement::Exact).collect())
	}

	pub fn append_exact(&self, segment: impl Into<String>) -> Matcher {
		let mut v = self.0.clone();
		v.push(MatchElement::Exact(segment.into()));
		Matcher(v)
	}

	pub fn append_any_element(&self) -> Matcher {
		let mut v = self.0.clone();
		v.push(MatchElement::AnyElement);
		Matcher(v)
	}

	pub fn append_any_subpath(&self) -> Matcher {
		let mut v = self.0.clone();
		v.push(MatchElement::AnySubpath);
		Matcher(v)
	}

	pub fn matches(&self, path: &Path) -> bool {
		Self::matches_elements(&self.0, path.segments())
	}

	fn matches_elements(elements: &[MatchElement], path: &[String]) -> bool {
		let Some((head, rest)) = elements.split_first() else {
			return path.is_empty();
		};

		match head {
			MatchElement::Exact(expected) => match path.split_first() {
				Some((first, tail)) if first == expected => Self::matches_elements(rest, tail),
				_ => false,
			},
			MatchElement::AnyElement => match path.split_first() {
				Some((_, tail)) => Self::matches_elements(rest, tail),
				None => false,
			},
			MatchElement::AnySubpath => {
				if rest.is_empty() {
					return true;
				}
				(0..=path.len()).any(|i| Self::matches_elements(rest, &path[i..]))
			}
		}
	}
}


// vim: ts=4
