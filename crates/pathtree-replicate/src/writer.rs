//! Records every operation performed against a local write transaction into
//! a byte stream a peer can replay and verify against its own state.

use pathtree_core::{Error, Path};
use pathtree_store::{ChildIterator, WriteTransaction};

use crate::codec::{tag, write_bool, write_bytes, write_data_or_hash, write_path, write_varuint};

/// Wraps a real local [`WriteTransaction`] (rather than a read-only one) so
/// that a writer reading back a key it just wrote in the same transaction
/// observes its own write, matching ordinary read-your-writes semantics.
/// A read-only wrapper cannot offer that guarantee, since nothing it records
/// would ever reflect the transaction's own pending mutations.
pub struct Writer<'tx> {
	tx: &'tx mut WriteTransaction,
	iterators: Vec<ChildIterator>,
	log: Vec<u8>,
}

impl<'tx> Writer<'tx> {
	pub fn new(tx: &'tx mut WriteTransaction) -> Self {
		Writer { tx, iterators: Vec::new(), log: Vec::new() }
	}

	/// The id the wrapped transaction will commit at.
	pub fn id(&self) -> u64 {
		self.tx.id()
	}

	/// Consumes the writer, returning the recorded stream. Does not commit
	/// the underlying transaction; the caller commits it through the normal
	/// `Database::write` path once recording is complete.
	pub fn finish(self) -> Vec<u8> {
		self.log
	}

	pub fn create_map(&mut self, path: &Path) -> Result<(), Error> {
		self.tx.create_map(path)?;
		self.log.push(tag::CREATE_MAP);
		write_path(&mut self.log, path);
		Ok(())
	}

	pub fn delete(&mut self, path: &Path) -> Result<(), Error> {
		self.tx.delete(path)?;
		self.log.push(tag::DELETE);
		write_path(&mut self.log, path);
		Ok(())
	}

	/// A put over a key that already holds a value first records an implicit
	/// `Get` of the prior bytes, so a peer whose prior value differs is
	/// caught as `Stale` at replay time rather than silently overwritten.
	pub fn put(&mut self, path: &Path, bytes: &[u8]) -> Result<(), Error> {
		if let Ok(prior) = self.tx.get(path) {
			self.log.push(tag::GET);
			write_path(&mut self.log, path);
			write_data_or_hash(&mut self.log, &prior);
		}
		self.tx.put(path, bytes)?;
		self.log.push(tag::PUT);
		write_path(&mut self.log, path);
		write_bytes(&mut self.log, bytes);
		Ok(())
	}

	pub fn exists(&mut self, path: &Path) -> Result<bool, Error> {
		let result = self.tx.exists(path)?;
		self.log.push(tag::EXISTS);
		write_path(&mut self.log, path);
		write_bool(&mut self.log, result);
		Ok(result)
	}

	pub fn is_map(&mut self, path: &Path) -> Result<bool, Error> {
		let result = self.tx.is_map(path)?;
		self.log.push(tag::IS_MAP);
		write_path(&mut self.log, path);
		write_bool(&mut self.log, result);
		Ok(result)
	}

	pub fn get(&mut self, path: &Path) -> Result<Vec<u8>, Error> {
		let result = self.tx.get(path)?;
		self.log.push(tag::GET);
		write_path(&mut self.log, path);
		write_data_or_hash(&mut self.log, &result);
		Ok(result)
	}

	pub fn size(&mut self, path: &Path) -> Result<u64, Error> {
		let result = self.tx.size_of(path)?;
		self.log.push(tag::SIZE);
		write_path(&mut self.log, path);
		write_varuint(&mut self.log, result);
		Ok(result)
	}

	pub fn set_fill_percent(&mut self, f: f64) -> Result<(), Error> {
		self.tx.set_fill_percent(f)?;
		self.log.push(tag::SET_FILL_PERCENT);
		write_varuint(&mut self.log, f.to_bits());
		Ok(())
	}

	/// Opens a local iterator over `path`'s children, recording it under the
	/// next allocation index. The replayer allocates indices identically
	/// (one per `NewIterator` record, in record order), so indices always
	/// line up without being carried on the wire.
	pub fn new_iterator(&mut self, path: &Path) -> Result<usize, Error> {
		let it = self.tx.iterate(path)?;
		self.log.push(tag::NEW_ITERATOR);
		write_path(&mut self.log, path);
		self.iterators.push(it);
		Ok(self.iterators.len() - 1)
	}

	fn iterator(&self, idx: usize) -> Result<&ChildIterator, Error> {
		self.iterators.get(idx).ok_or_else(|| {
			Error::new(pathtree_core::ErrorKind::Protocol, format!("no iterator at index {idx}"))
		})
	}

	fn iterator_mut(&mut self, idx: usize) -> Result<&mut ChildIterator, Error> {
		self.iterators.get_mut(idx).ok_or_else(|| {
			Error::new(pathtree_core::ErrorKind::Protocol, format!("no iterator at index {idx}"))
		})
	}

	pub fn iterator_is_done(&mut self, idx: usize) -> Result<bool, Error> {
		let done = self.iterator(idx)?.is_done();
		self.log.push(tag::ITERATOR_IS_DONE);
		write_varuint(&mut self.log, idx as u64);
		write_bool(&mut self.log, done);
		Ok(done)
	}

	/// Only meaningful once the caller has confirmed `iterator_is_done` is
	/// `false`; the done/not-done distinction travels on its own record, so
	/// this one never needs to represent it.
	pub fn iterator_get_key(&mut self, idx: usize) -> Result<String, Error> {
		let it = self.iterator(idx)?;
		let key = it
			.get_key()
			.ok_or_else(|| Error::new(pathtree_core::ErrorKind::Protocol, "get_key on a done iterator"))?
			.to_string();
		self.log.push(tag::ITERATOR_GET_KEY);
		write_varuint(&mut self.log, idx as u64);
		write_bytes(&mut self.log, key.as_bytes());
		Ok(key)
	}

	/// `None` for a map child; `Some(bytes)` for a value child. The map/value
	/// distinction is carried as a leading flag byte so a zero-length stored
	/// value is never confused with "this child is a map".
	pub fn iterator_get_value(&mut self, idx: usize) -> Result<Option<Vec<u8>>, Error> {
		let it = self.iterator(idx)?;
		let value = it
			.get_value()
			.ok_or_else(|| Error::new(pathtree_core::ErrorKind::Protocol, "get_value on a done iterator"))?;
		self.log.push(tag::ITERATOR_GET_VALUE);
		write_varuint(&mut self.log, idx as u64);
		match &value {
			None => write_bool(&mut self.log, true),
			Some(bytes) => {
				write_bool(&mut self.log, false);
				write_data_or_hash(&mut self.log, bytes);
			}
		}
		Ok(value)
	}

	pub fn iterator_next(&mut self, idx: usize) -> Result<(), Error> {
		self.iterator_mut(idx)?.next();
		self.log.push(tag::ITERATOR_NEXT);
		write_varuint(&mut self.log, idx as u64);
		Ok(())
	}

	pub fn iterator_prev(&mut self, idx: usize) -> Result<(), Error> {
		self.iterator_mut(idx)?.prev();
		self.log.push(tag::ITERATOR_PREV);
		write_varuint(&mut self.log, idx as u64);
		Ok(())
	}

	pub fn iterator_first(&mut self, idx: usize) -> Result<(), Error> {
		self.iterator_mut(idx)?.first();
		self.log.push(tag::ITERATOR_FIRST);
		write_varuint(&mut self.log, idx as u64);
		Ok(())
	}

	pub fn iterator_last(&mut self, idx: usize) -> Result<(), Error> {
		self.iterator_mut(idx)?.last();
		self.log.push(tag::ITERATOR_LAST);
		write_varuint(&mut self.log, idx as u64);
		Ok(())
	}

	pub fn iterator_seek(&mut self, idx: usize, key: &str) -> Result<(), Error> {
		self.iterator_mut(idx)?.seek(key);
		self.log.push(tag::ITERATOR_SEEK);
		write_varuint(&mut self.log, idx as u64);
		write_bytes(&mut self.log, key.as_bytes());
		Ok(())
	}
}

// vim: ts=4
