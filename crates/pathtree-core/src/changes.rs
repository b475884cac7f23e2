use crate::path::Path;

/// What happened to a path within a committed write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
	MapCreated,
	ValueSet,
	Deleted,
}

/// A single coalesced entry in an [`ObservedChanges`] list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedChange {
	pub path: Path,
	pub kind: ChangeKind,
}

/// The coalesced, ordered record of every path a write transaction touched.
/// `update` is a pure function so the coalescing law can be exercised without
/// an engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservedChanges(Vec<ObservedChange>);

impl ObservedChanges {
	pub fn new() -> Self {
		ObservedChanges(Vec::new())
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &ObservedChange> {
		self.0.iter()
	}

	/// Applies one more observed effect to the list, maintaining the
	/// coalescing law: `ValueSet`/`MapCreated` overwrite an existing entry for
	/// the exact same path (else append); `Deleted` drops every entry at or
	/// below `path` before appending itself, since a deletion of an ancestor
	/// invalidates every change recorded under it.
	pub fn update(&mut self, path: Path, kind: ChangeKind) {
		match kind {
			ChangeKind::MapCreated | ChangeKind::ValueSet => {
				if let Some(existing) = self.0.iter_mut().find(|c| c.path == path) {
					existing.kind = kind;
				} else {
					self.0.push(ObservedChange { path, kind });
				}
			}
			ChangeKind::Deleted => {
				let subtree = path.to_matcher().append_any_subpath();
				self.0.retain(|c| !subtree.matches(&c.path));
				self.0.push(ObservedChange { path, kind: ChangeKind::Deleted });
			}
		}
	}

	/// The coalesced effect on `path`: `Deleted` if any `Deleted` entry's
	/// subtree covers it, else the kind of the last matching exact entry,
	/// else `None` (no observed change to `path`).
	pub fn type_of_change(&self, path: &Path) -> Option<ChangeKind> {
		let deleted_by = self.0.iter().find(|c| {
			c.kind == ChangeKind::Deleted && c.path.to_matcher().append_any_subpath().matches(path)
		});
		if deleted_by.is_some() {
			return Some(ChangeKind::Deleted);
		}
		self.0.iter().rev().find(|c| c.path == *path).map(|c| c.kind)
	}

	/// Filters this list the way the observer hub does for one subscriber:
	/// every `Deleted` entry passes unconditionally, everything else only if
	/// `matcher` matches its path.
	pub fn filter_for(&self, matcher: &crate::matcher::Matcher) -> ObservedChanges {
		ObservedChanges(
			self.0
				.iter()
				.filter(|c| c.kind == ChangeKind::Deleted || matcher.matches(&c.path))
				.cloned()
				.collect(),
		)
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
	use super::*;

	#[test]
	fn value_set_overwrites_same_path() {
		let mut c = ObservedChanges::new();
		c.update(Path::from_segments(["a"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["a"]), ChangeKind::MapCreated);
		assert_eq!(c.iter().count(), 1);
		assert_eq!(c.type_of_change(&Path::from_segments(["a"])), Some(ChangeKind::MapCreated));
	}

	#[test]
	fn delete_drops_descendants() {
		let mut c = ObservedChanges::new();
		c.update(Path::from_segments(["a", "b"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["a", "c"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["a"]), ChangeKind::Deleted);
		assert_eq!(c.iter().count(), 1);
		assert_eq!(c.type_of_change(&Path::from_segments(["a", "b"])), Some(ChangeKind::Deleted));
		assert_eq!(c.type_of_change(&Path::from_segments(["a"])), Some(ChangeKind::Deleted));
	}

	#[test]
	fn order_is_first_introduction() {
		let mut c = ObservedChanges::new();
		c.update(Path::from_segments(["b"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["a"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["b"]), ChangeKind::ValueSet);
		let paths: Vec<_> = c.iter().map(|e| e.path.clone()).collect();
		assert_eq!(paths, vec![Path::from_segments(["b"]), Path::from_segments(["a"])]);
	}

	#[test]
	fn no_change_for_untouched_path() {
		let c = ObservedChanges::new();
		assert_eq!(c.type_of_change(&Path::from_segments(["x"])), None);
	}

	#[test]
	fn filter_for_passes_deletes_unconditionally() {
		let mut c = ObservedChanges::new();
		c.update(Path::from_segments(["a"]), ChangeKind::ValueSet);
		c.update(Path::from_segments(["z"]), ChangeKind::Deleted);
		let m = Path::from_segments(["z"]).to_matcher();
		let filtered = c.filter_for(&m);
		assert_eq!(filtered.iter().count(), 1);
		assert_eq!(filtered.iter().next().unwrap().kind, ChangeKind::Deleted);
	}
}

// vim: ts=4
