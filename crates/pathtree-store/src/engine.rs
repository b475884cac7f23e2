//! The flat-table adapter over redb that stands in for the nested-bucket
//! B+tree engine spec.md assumes. redb has no dynamic nested buckets
//! (`TableDefinition` names must be `'static`), so the hierarchy is flattened
//! into one table keyed by the canonical wire path string, with a sibling
//! table holding the authoritative per-map child count.
//!
//! Known limitation: `DOCS` is keyed on the percent-escaped wire form, so a
//! range scan over it visits direct children in escaped-byte order, not raw
//! segment order — a child whose segment needs escaping can scan out of
//! place relative to one that doesn't (`transaction.rs`'s `iterate` decodes
//! each remainder and re-sorts the collected page to recover the raw
//! ascending-byte-wise order the original nested-bucket engine gets for
//! free from keying directly on segment bytes).

use pathtree_core::Path;
use redb::TableDefinition;

/// Every map marker and value payload, keyed by `Path::to_string()` (the root
/// is the empty string). A map is stored as `MARKER_MAP`; a value is stored
/// as `MARKER_VALUE` followed by its bytes.
pub const DOCS: TableDefinition<&str, &[u8]> = TableDefinition::new("docs");

/// Per-map direct-child count, keyed the same way. This is the Rust
/// equivalent of the nested-bucket engine's per-bucket sequence counter.
pub const SIZES: TableDefinition<&str, u64> = TableDefinition::new("sizes");

pub const MARKER_MAP: u8 = b'M';
pub const MARKER_VALUE: u8 = b'V';

/// Decoded form of a `DOCS` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
	Map,
	Value(Vec<u8>),
}

pub fn encode_map() -> Vec<u8> {
	vec![MARKER_MAP]
}

pub fn encode_value(bytes: &[u8]) -> Vec<u8> {
	let mut v = Vec::with_capacity(bytes.len() + 1);
	v.push(MARKER_VALUE);
	v.extend_from_slice(bytes);
	v
}

/// Decodes a raw `DOCS` row. Panics only on storage corruption (a row that is
/// neither a map marker nor a value marker), which cannot happen through this
/// module's own writers.
pub fn decode_entry(raw: &[u8]) -> Entry {
	match raw.split_first() {
		Some((&MARKER_MAP, _)) => Entry::Map,
		Some((&MARKER_VALUE, rest)) => Entry::Value(rest.to_vec()),
		_ => unreachable!("docs table row with neither map nor value marker"),
	}
}

/// The direct-child key prefix for `path`: its wire form plus a trailing
/// separator, so that a range scan from this prefix visits exactly the
/// descendants of `path`.
pub fn child_prefix(path: &Path) -> String {
	if path.is_root() { String::new() } else { format!("{}/", path) }
}

/// Whether `candidate_remainder` (the part of a scanned key after
/// `child_prefix`) names a direct child rather than a deeper descendant.
pub fn is_direct_child(remainder: &str) -> bool {
	!remainder.contains('/')
}


// vim: ts=4
