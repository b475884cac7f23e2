use crate::engine::Entry;

/// A snapshot of a map's direct children, ordered by ascending raw-segment
/// key (callers of `iterate` decode and re-sort the backing redb range scan
/// before constructing this, since the flat table is keyed on escaped wire
/// bytes — see `engine` module docs). Taken at creation time: the owning
/// transaction's MVCC view guarantees nothing in this snapshot mutates for
/// the transaction's lifetime.
pub struct ChildIterator {
	children: Vec<(String, Entry)>,
	pos: Option<usize>,
}

impl ChildIterator {
	pub(crate) fn new(children: Vec<(String, Entry)>) -> Self {
		let pos = if children.is_empty() { None } else { Some(0) };
		ChildIterator { children, pos }
	}

	/// `true` once iteration has run past the last (or before the first)
	/// child.
	pub fn is_done(&self) -> bool {
		self.pos.is_none()
	}

	pub fn has_next(&self) -> bool {
		match self.pos {
			Some(i) => i + 1 < self.children.len(),
			None => false,
		}
	}

	pub fn get_key(&self) -> Option<&str> {
		self.pos.map(|i| self.children[i].0.as_str())
	}

	/// `None` for a value the current key is a map for; `Some(bytes)` for a
	/// defensive copy of the value's bytes.
	pub fn get_value(&self) -> Option<Option<Vec<u8>>> {
		self.pos.map(|i| match &self.children[i].1 {
			Entry::Map => None,
			Entry::Value(bytes) => Some(bytes.clone()),
		})
	}

	/// Advances past the end idempotently once Done.
	pub fn next(&mut self) {
		self.pos = match self.pos {
			Some(i) if i + 1 < self.children.len() => Some(i + 1),
			_ => None,
		};
	}

	/// Retreats before the start idempotently once before-first.
	pub fn prev(&mut self) {
		self.pos = match self.pos {
			Some(0) | None => None,
			Some(i) => Some(i - 1),
		};
	}

	pub fn first(&mut self) {
		self.pos = if self.children.is_empty() { None } else { Some(0) };
	}

	pub fn last(&mut self) {
		self.pos = if self.children.is_empty() { None } else { Some(self.children.len() - 1) };
	}

	/// Positions at the first child whose key is ≥ `key`; Done if none.
	pub fn seek(&mut self, key: &str) {
		self.pos = self.children.iter().position(|(k, _)| k.as_str() >= key);
	}
}


// vim: ts=4
