use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use pathtree_core::{ChangeKind, Error, ErrorKind, ObservedChanges, Path};
use redb::ReadableTable;

use crate::engine::{self, Entry};
use crate::error::from_redb_error;
use crate::iterator::ChildIterator;

/// Copies the backing file's bytes to `writer`. Safe to call while `tx` (a
/// redb read or write transaction) is still open: redb's copy-on-write pages
/// mean the file on disk always reflects the last *committed* state, and
/// holding any transaction open pins that snapshot against reclamation by a
/// concurrent writer's page recycling.
fn dump_file(db_path: &PathBuf, writer: &mut dyn Write) -> Result<(), Error> {
	let mut file = std::fs::File::open(db_path).map_err(|e| Error::new(ErrorKind::Engine, e.to_string()))?;
	std::io::copy(&mut file, writer).map_err(|e| Error::new(ErrorKind::Engine, e.to_string()))?;
	Ok(())
}

fn check_fill_percent(f: f64) -> Result<(), Error> {
	if (0.1..=1.0).contains(&f) {
		Ok(())
	} else {
		Err(Error::new(ErrorKind::Precondition, format!("fill percent {f} out of range [0.1, 1.0]")))
	}
}

/// Reads one `DOCS` row through any readable table handle.
fn read_entry<T: ReadableTable<&'static str, &'static [u8]>>(
	table: &T,
	path: &Path,
) -> Result<Option<Entry>, Error> {
	let key = path.to_string();
	match table.get(key.as_str()).map_err(from_redb_error)? {
		Some(v) => Ok(Some(engine::decode_entry(v.value()))),
		None => Ok(None),
	}
}

/// A write transaction over the store. Single-threaded: it owns a `redb`
/// write transaction and must not be handed across threads.
pub struct WriteTransaction {
	id: u64,
	tx: redb::WriteTransaction,
	db_path: Arc<PathBuf>,
	fill_percent: f64,
	cancel: Option<tokio_util::sync::CancellationToken>,
	changes: ObservedChanges,
}

impl WriteTransaction {
	pub(crate) fn new(
		id: u64,
		tx: redb::WriteTransaction,
		db_path: Arc<PathBuf>,
		cancel: Option<tokio_util::sync::CancellationToken>,
	) -> Self {
		WriteTransaction { id, tx, db_path, fill_percent: 1.0, cancel, changes: ObservedChanges::new() }
	}

	fn check_cancelled(&self) -> Result<(), Error> {
		if self.cancel.as_ref().is_some_and(tokio_util::sync::CancellationToken::is_cancelled) {
			return Err(Error::new(ErrorKind::Precondition, "transaction cancelled"));
		}
		Ok(())
	}

	fn tx(&self) -> &redb::WriteTransaction {
		&self.tx
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn set_fill_percent(&mut self, f: f64) -> Result<(), Error> {
		check_fill_percent(f)?;
		self.fill_percent = f;
		Ok(())
	}

	pub fn fill_percent(&self) -> f64 {
		self.fill_percent
	}

	fn entry(&self, path: &Path) -> Result<Option<Entry>, Error> {
		let table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
		read_entry(&table, path)
	}

	fn size_table_get(&self, path: &Path) -> Result<u64, Error> {
		let table = self.tx().open_table(engine::SIZES).map_err(from_redb_error)?;
		let key = path.to_string();
		Ok(table.get(key.as_str()).map_err(from_redb_error)?.map_or(0, |v| v.value()))
	}

	fn size_table_set(&self, path: &Path, value: u64) -> Result<(), Error> {
		let mut table = self.tx().open_table(engine::SIZES).map_err(from_redb_error)?;
		let key = path.to_string();
		table.insert(key.as_str(), value).map_err(from_redb_error)?;
		Ok(())
	}

	/// Checks that every proper ancestor of `path` is a map that exists. In
	/// this flat-table model the invariant that a map's own ancestors were
	/// validated holds inductively from the precondition enforced at that
	/// map's creation, so checking the immediate parent is sufficient;
	/// checking it explicitly (rather than trusting the invariant blindly)
	/// still catches corruption.
	fn check_parent_is_map(&self, path: &Path) -> Result<(), Error> {
		let parent = path.parent();
		if parent.is_root() {
			return Ok(());
		}
		match self.entry(&parent)? {
			Some(Entry::Map) => Ok(()),
			Some(Entry::Value(_)) => {
				Err(Error::new(ErrorKind::Precondition, format!("parent of {path} is a value, not a map")))
			}
			None => Err(Error::new(ErrorKind::NotFound, format!("parent of {path} does not exist"))),
		}
	}

	pub fn exists(&self, path: &Path) -> Result<bool, Error> {
		self.check_cancelled()?;
		if path.is_root() {
			return Ok(true);
		}
		Ok(self.entry(path)?.is_some())
	}

	pub fn is_map(&self, path: &Path) -> Result<bool, Error> {
		self.check_cancelled()?;
		if path.is_root() {
			return Ok(true);
		}
		match self.entry(path)? {
			Some(Entry::Map) => Ok(true),
			Some(Entry::Value(_)) => Ok(false),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	pub fn get(&self, path: &Path) -> Result<Vec<u8>, Error> {
		self.check_cancelled()?;
		match self.entry(path)? {
			Some(Entry::Value(bytes)) => Ok(bytes),
			Some(Entry::Map) => Err(Error::new(ErrorKind::Conflict, format!("{path} is a map"))),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	pub fn size_of(&self, path: &Path) -> Result<u64, Error> {
		self.check_cancelled()?;
		match self.entry(path)? {
			Some(Entry::Value(bytes)) => Ok(bytes.len() as u64),
			Some(Entry::Map) => self.size_table_get(path),
			None if path.is_root() => self.size_table_get(path),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	pub fn create_map(&mut self, path: &Path) -> Result<(), Error> {
		self.check_cancelled()?;
		if path.is_root() {
			return Err(Error::new(ErrorKind::Precondition, "cannot create the root map"));
		}
		self.check_parent_is_map(path)?;
		if self.entry(path)?.is_some() {
			return Err(Error::new(ErrorKind::Conflict, format!("{path} already exists")));
		}
		{
			let mut table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
			let key = path.to_string();
			table.insert(key.as_str(), engine::encode_map().as_slice()).map_err(from_redb_error)?;
		}
		let parent = path.parent();
		let parent_size = self.size_table_get(&parent)?;
		self.size_table_set(&parent, parent_size + 1)?;
		self.changes.update(path.clone(), ChangeKind::MapCreated);
		Ok(())
	}

	pub fn put(&mut self, path: &Path, bytes: &[u8]) -> Result<(), Error> {
		self.check_cancelled()?;
		if path.is_root() {
			return Err(Error::new(ErrorKind::Precondition, "cannot put a value at the root"));
		}
		self.check_parent_is_map(path)?;
		let existing = self.entry(path)?;
		if matches!(existing, Some(Entry::Map)) {
			return Err(Error::new(ErrorKind::Conflict, format!("{path} is an existing map")));
		}
		{
			let mut table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
			let key = path.to_string();
			table.insert(key.as_str(), engine::encode_value(bytes).as_slice()).map_err(from_redb_error)?;
		}
		if existing.is_none() {
			let parent = path.parent();
			let parent_size = self.size_table_get(&parent)?;
			self.size_table_set(&parent, parent_size + 1)?;
		}
		self.changes.update(path.clone(), ChangeKind::ValueSet);
		Ok(())
	}

	pub fn delete(&mut self, path: &Path) -> Result<(), Error> {
		self.check_cancelled()?;
		if path.is_root() {
			return Err(Error::new(ErrorKind::Precondition, "cannot delete the root"));
		}
		let existing = self.entry(path)?.ok_or_else(|| {
			Error::new(ErrorKind::NotFound, format!("{path} does not exist"))
		})?;

		if matches!(existing, Entry::Map) {
			self.delete_subtree(path)?;
		} else {
			let mut table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
			let key = path.to_string();
			table.remove(key.as_str()).map_err(from_redb_error)?;
		}

		let parent = path.parent();
		let parent_size = self.size_table_get(&parent)?;
		if parent_size == 0 {
			return Err(Error::new(ErrorKind::Engine, format!("size of {parent} underflowed on delete of {path}")));
		}
		self.size_table_set(&parent, parent_size - 1)?;
		{
			let mut sizes = self.tx().open_table(engine::SIZES).map_err(from_redb_error)?;
			let key = path.to_string();
			sizes.remove(key.as_str()).map_err(from_redb_error)?;
		}
		self.changes.update(path.clone(), ChangeKind::Deleted);
		Ok(())
	}

	fn delete_subtree(&self, path: &Path) -> Result<(), Error> {
		let prefix = engine::child_prefix(path);
		let keys: Vec<String> = {
			let table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
			let mut keys = vec![path.to_string()];
			let range = table.range(prefix.as_str()..).map_err(from_redb_error)?;
			for item in range {
				let (k, _) = item.map_err(from_redb_error)?;
				let k = k.value();
				if !k.starts_with(prefix.as_str()) {
					break;
				}
				keys.push(k.to_string());
			}
			keys
		};
		let mut docs = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
		let mut sizes = self.tx().open_table(engine::SIZES).map_err(from_redb_error)?;
		for k in &keys {
			docs.remove(k.as_str()).map_err(from_redb_error)?;
			sizes.remove(k.as_str()).map_err(from_redb_error)?;
		}
		Ok(())
	}

	pub fn iterate(&self, path: &Path) -> Result<ChildIterator, Error> {
		self.check_cancelled()?;
		if !path.is_root() {
			match self.entry(path)? {
				Some(Entry::Map) => {}
				Some(Entry::Value(_)) => {
					return Err(Error::new(ErrorKind::Conflict, format!("{path} is a value, not a map")));
				}
				None => return Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
			}
		}
		let children = self.scan_direct_children(path)?;
		Ok(ChildIterator::new(children))
	}

	/// Range-scans the `DOCS` table under `path`'s child prefix, decodes each
	/// remainder back to its raw segment (the table is keyed on the
	/// percent-escaped wire form, so a raw segment containing an escaped
	/// byte would otherwise surface escaped — and sort before the segments
	/// it's supposed to follow, since redb orders keys by their escaped
	/// bytes), then re-sorts by the decoded key so iteration order matches
	/// §3's "ascending byte-wise key order" of the true segment rather than
	/// of its wire encoding.
	fn scan_direct_children(&self, path: &Path) -> Result<Vec<(String, Entry)>, Error> {
		let prefix = engine::child_prefix(path);
		let table = self.tx().open_table(engine::DOCS).map_err(from_redb_error)?;
		let mut children = Vec::new();
		let range = table.range(prefix.as_str()..).map_err(from_redb_error)?;
		for item in range {
			let (k, v) = item.map_err(from_redb_error)?;
			let key = k.value();
			if !key.starts_with(prefix.as_str()) {
				break;
			}
			let remainder = &key[prefix.len()..];
			if !engine::is_direct_child(remainder) {
				continue;
			}
			let segment = Path::decode_segment(remainder)?;
			let entry = engine::decode_entry(v.value());
			children.push((segment, entry));
		}
		children.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(children)
	}

	/// Writes a consistent snapshot of the whole database file to `writer`,
	/// as of the last commit before this transaction began.
	pub fn dump_database(&self, writer: &mut dyn Write) -> Result<(), Error> {
		dump_file(&self.db_path, writer)
	}

	/// Consumes the transaction, committing the underlying engine
	/// transaction and returning the coalesced change list for the observer
	/// hub to dispatch.
	pub fn commit(self) -> Result<ObservedChanges, Error> {
		self.tx.commit().map_err(from_redb_error)?;
		Ok(self.changes)
	}

	/// Consumes the transaction, discarding every change it made (`redb`
	/// rolls back a write transaction that is dropped without committing).
	pub fn rollback(self) {}
}

/// A read-only transaction, exposing the read-only subset of the write
/// contract.
pub struct ReadTransaction {
	id: u64,
	tx: redb::ReadTransaction,
	db_path: Arc<PathBuf>,
}

impl ReadTransaction {
	pub(crate) fn new(id: u64, tx: redb::ReadTransaction, db_path: Arc<PathBuf>) -> Self {
		ReadTransaction { id, tx, db_path }
	}

	/// Writes a consistent snapshot of the whole database file to `writer`,
	/// as of this transaction's begin.
	pub fn dump_database(&self, writer: &mut dyn Write) -> Result<(), Error> {
		dump_file(&self.db_path, writer)
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	fn entry(&self, path: &Path) -> Result<Option<Entry>, Error> {
		let table = self.tx.open_table(engine::DOCS).map_err(from_redb_error)?;
		read_entry(&table, path)
	}

	pub fn exists(&self, path: &Path) -> Result<bool, Error> {
		if path.is_root() {
			return Ok(true);
		}
		Ok(self.entry(path)?.is_some())
	}

	pub fn is_map(&self, path: &Path) -> Result<bool, Error> {
		if path.is_root() {
			return Ok(true);
		}
		match self.entry(path)? {
			Some(Entry::Map) => Ok(true),
			Some(Entry::Value(_)) => Ok(false),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	pub fn get(&self, path: &Path) -> Result<Vec<u8>, Error> {
		match self.entry(path)? {
			Some(Entry::Value(bytes)) => Ok(bytes),
			Some(Entry::Map) => Err(Error::new(ErrorKind::Conflict, format!("{path} is a map"))),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	pub fn size_of(&self, path: &Path) -> Result<u64, Error> {
		match self.entry(path)? {
			Some(Entry::Value(bytes)) => Ok(bytes.len() as u64),
			Some(Entry::Map) => self.size_table_get(path),
			None if path.is_root() => self.size_table_get(path),
			None => Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
		}
	}

	fn size_table_get(&self, path: &Path) -> Result<u64, Error> {
		let table = self.tx.open_table(engine::SIZES).map_err(from_redb_error)?;
		let key = path.to_string();
		Ok(table.get(key.as_str()).map_err(from_redb_error)?.map_or(0, |v| v.value()))
	}

	pub fn iterate(&self, path: &Path) -> Result<ChildIterator, Error> {
		if !path.is_root() {
			match self.entry(path)? {
				Some(Entry::Map) => {}
				Some(Entry::Value(_)) => {
					return Err(Error::new(ErrorKind::Conflict, format!("{path} is a value, not a map")));
				}
				None => return Err(Error::new(ErrorKind::NotFound, format!("{path} does not exist"))),
			}
		}
		let prefix = engine::child_prefix(path);
		let table = self.tx.open_table(engine::DOCS).map_err(from_redb_error)?;
		let mut children = Vec::new();
		let range = table.range(prefix.as_str()..).map_err(from_redb_error)?;
		for item in range {
			let (k, v) = item.map_err(from_redb_error)?;
			let key = k.value();
			if !key.starts_with(prefix.as_str()) {
				break;
			}
			let remainder = &key[prefix.len()..];
			if !engine::is_direct_child(remainder) {
				continue;
			}
			let segment = Path::decode_segment(remainder)?;
			children.push((segment, engine::decode_entry(v.value())));
		}
		children.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(ChildIterator::new(children))
	}
}

// vim: ts=4
