//! Applies a recorded transaction stream against a local database, executing
//! every mutation and re-verifying every observation against local state.
//!
//! Unlike a naive transcript player, this walks the *entire* stream to EOF:
//! a partial reader that stops after the first record would silently accept
//! a stream whose tail has gone stale.

use pathtree_core::{Error, ErrorKind};
use pathtree_store::{ChildIterator, Database, WriteTransaction};
use tracing::{debug, warn};

use crate::codec::{self, tag, verify_data_or_hash, Cursor};

/// The outcome of a successful replay: the id of the local transaction the
/// stream was committed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
	pub transaction_id: u64,
}

/// Replays `stream` against `db`, committing on success and rolling back
/// (via the underlying write failing) on any mutation error or any
/// observation mismatch.
pub async fn replay(db: &Database, stream: Vec<u8>) -> Result<ReplayOutcome, Error> {
	let id = db.write(move |tx| replay_into(tx, &stream)).await?;
	Ok(ReplayOutcome { transaction_id: id })
}

fn replay_into(tx: &mut WriteTransaction, stream: &[u8]) -> Result<u64, Error> {
	let mut cursor = Cursor::new(stream);
	let mut iterators: Vec<ChildIterator> = Vec::new();

	while !cursor.is_at_end() {
		let record_tag = cursor.read_byte()?;
		if let Err(e) = apply_record(tx, &mut cursor, &mut iterators, record_tag) {
			match e.kind() {
				ErrorKind::Stale => warn!("stale replay: record tag {record_tag} rejected: {e}"),
				ErrorKind::Protocol => warn!("malformed transaction stream: record tag {record_tag}: {e}"),
				_ => {}
			}
			return Err(e);
		}
	}

	debug!("replayed transaction stream as transaction {}", tx.id());
	Ok(tx.id())
}

fn apply_record(
	tx: &mut WriteTransaction,
	cursor: &mut Cursor<'_>,
	iterators: &mut Vec<ChildIterator>,
	record_tag: u8,
) -> Result<(), Error> {
	match record_tag {
		tag::CREATE_MAP => {
			let path = codec::read_path(cursor)?;
			tx.create_map(&path)
		}
		tag::DELETE => {
			let path = codec::read_path(cursor)?;
			tx.delete(&path)
		}
		tag::PUT => {
			let path = codec::read_path(cursor)?;
			let bytes = codec::read_bytes(cursor)?;
			tx.put(&path, &bytes)
		}
		tag::EXISTS => {
			let path = codec::read_path(cursor)?;
			let recorded = codec::read_bool(cursor)?;
			let actual = tx.exists(&path)?;
			check_bool(recorded, actual, "Exists")
		}
		tag::IS_MAP => {
			let path = codec::read_path(cursor)?;
			let recorded = codec::read_bool(cursor)?;
			let actual = tx.is_map(&path)?;
			check_bool(recorded, actual, "IsMap")
		}
		tag::GET => {
			let path = codec::read_path(cursor)?;
			let recorded = codec::read_data_or_hash(cursor)?;
			let actual = tx.get(&path)?;
			verify_data_or_hash(&recorded, &actual)
		}
		tag::SIZE => {
			let path = codec::read_path(cursor)?;
			let recorded = codec::read_varuint(cursor)?;
			let actual = tx.size_of(&path)?;
			if recorded == actual {
				Ok(())
			} else {
				Err(Error::new(ErrorKind::Stale, format!("Size({path}) recorded {recorded}, observed {actual}")))
			}
		}
		tag::NEW_ITERATOR => {
			let path = codec::read_path(cursor)?;
			let it = tx.iterate(&path)?;
			iterators.push(it);
			Ok(())
		}
		tag::ITERATOR_GET_KEY => {
			let idx = read_index(cursor)?;
			let recorded = codec::read_bytes(cursor)?;
			let recorded = String::from_utf8(recorded).map_err(|e| Error::new(ErrorKind::Protocol, e.to_string()))?;
			let it = iterator_at(iterators, idx)?;
			let actual = it.get_key().ok_or_else(|| protocol("IteratorGetKey on a done iterator"))?;
			if actual == recorded {
				Ok(())
			} else {
				Err(Error::new(ErrorKind::Stale, format!("iterator {idx} key recorded {recorded:?}, observed {actual:?}")))
			}
		}
		tag::ITERATOR_GET_VALUE => {
			let idx = read_index(cursor)?;
			let recorded_is_map = codec::read_bool(cursor)?;
			let recorded_doh = if recorded_is_map { None } else { Some(codec::read_data_or_hash(cursor)?) };
			let it = iterator_at(iterators, idx)?;
			let actual = it.get_value().ok_or_else(|| protocol("IteratorGetValue on a done iterator"))?;
			match (recorded_is_map, actual, recorded_doh) {
				(true, None, _) => Ok(()),
				(false, Some(bytes), Some(doh)) => verify_data_or_hash(&doh, &bytes),
				_ => Err(Error::new(ErrorKind::Stale, format!("iterator {idx} map/value kind diverged"))),
			}
		}
		tag::ITERATOR_IS_DONE => {
			let idx = read_index(cursor)?;
			let recorded = codec::read_bool(cursor)?;
			let actual = iterator_at(iterators, idx)?.is_done();
			check_bool(recorded, actual, "IteratorIsDone")
		}
		tag::ITERATOR_NEXT => {
			let idx = read_index(cursor)?;
			iterator_at_mut(iterators, idx)?.next();
			Ok(())
		}
		tag::ITERATOR_PREV => {
			let idx = read_index(cursor)?;
			iterator_at_mut(iterators, idx)?.prev();
			Ok(())
		}
		tag::ITERATOR_FIRST => {
			let idx = read_index(cursor)?;
			iterator_at_mut(iterators, idx)?.first();
			Ok(())
		}
		tag::ITERATOR_LAST => {
			let idx = read_index(cursor)?;
			iterator_at_mut(iterators, idx)?.last();
			Ok(())
		}
		tag::ITERATOR_SEEK => {
			let idx = read_index(cursor)?;
			let key = codec::read_bytes(cursor)?;
			let key = String::from_utf8(key).map_err(|e| Error::new(ErrorKind::Protocol, e.to_string()))?;
			iterator_at_mut(iterators, idx)?.seek(&key);
			Ok(())
		}
		tag::SET_FILL_PERCENT => {
			let bits = codec::read_varuint(cursor)?;
			tx.set_fill_percent(f64::from_bits(bits))
		}
		other => Err(Error::new(ErrorKind::Protocol, format!("unknown transaction stream record tag {other}"))),
	}
}

fn read_index(cursor: &mut Cursor<'_>) -> Result<usize, Error> {
	let idx = codec::read_varuint(cursor)?;
	usize::try_from(idx).map_err(|_| protocol("iterator index overflow"))
}

fn iterator_at(iterators: &[ChildIterator], idx: usize) -> Result<&ChildIterator, Error> {
	iterators.get(idx).ok_or_else(|| protocol(&format!("no iterator at index {idx}")))
}

fn iterator_at_mut(iterators: &mut [ChildIterator], idx: usize) -> Result<&mut ChildIterator, Error> {
	iterators.get_mut(idx).ok_or_else(|| protocol(&format!("no iterator at index {idx}")))
}

fn protocol(message: &str) -> Error {
	Error::new(ErrorKind::Protocol, message.to_string())
}

fn check_bool(recorded: bool, actual: bool, op: &str) -> Result<(), Error> {
	if recorded == actual {
		Ok(())
	} else {
		Err(Error::new(ErrorKind::Stale, format!("{op} recorded {recorded}, observed {actual}")))
	}
}

// vim: ts=4
