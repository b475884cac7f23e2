//! Wire primitives for the transaction stream: varuints, length-prefixed
//! paths/strings/bytes, and the data-or-hash encoding used for every
//! recorded observation.

use pathtree_core::{Error, ErrorKind, Path};

/// The fixed, build-time key shared by every writer and replayer. A real
/// deployment would provision this per-cluster; it is a constant here
/// because writer and replayer must agree on it without a handshake.
pub const HASH_KEY: [u8; 32] = [
	0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
	0xf0, 0xe0, 0xd0, 0xc0, 0xb0, 0xa0, 0x90, 0x80, 0x70, 0x60, 0x50, 0x40, 0x30, 0x20, 0x10, 0x00,
];

/// Any byte sequence shorter than this is inlined; at or above it, only its
/// hash is recorded.
const INLINE_THRESHOLD: usize = 17;

/// Record tag bytes. 0 is reserved (never written, always a protocol error
/// on read) so a zeroed or truncated stream is never silently accepted.
pub mod tag {
	pub const CREATE_MAP: u8 = 1;
	pub const DELETE: u8 = 2;
	pub const PUT: u8 = 3;
	pub const EXISTS: u8 = 4;
	pub const IS_MAP: u8 = 5;
	pub const GET: u8 = 6;
	pub const SIZE: u8 = 7;
	pub const NEW_ITERATOR: u8 = 8;
	pub const ITERATOR_GET_KEY: u8 = 9;
	pub const ITERATOR_GET_VALUE: u8 = 10;
	pub const ITERATOR_IS_DONE: u8 = 11;
	pub const ITERATOR_PREV: u8 = 12;
	pub const ITERATOR_NEXT: u8 = 13;
	pub const ITERATOR_SEEK: u8 = 14;
	pub const ITERATOR_FIRST: u8 = 15;
	pub const ITERATOR_LAST: u8 = 16;
	pub const SET_FILL_PERCENT: u8 = 17;
}

pub fn write_varuint(out: &mut Vec<u8>, mut value: u64) {
	loop {
		let mut byte = (value & 0x7f) as u8;
		value >>= 7;
		if value != 0 {
			byte |= 0x80;
		}
		out.push(byte);
		if value == 0 {
			break;
		}
	}
}

pub fn read_varuint(cursor: &mut Cursor<'_>) -> Result<u64, Error> {
	let mut result: u64 = 0;
	let mut shift = 0u32;
	loop {
		let byte = cursor.read_byte()?;
		result |= u64::from(byte & 0x7f) << shift;
		if byte & 0x80 == 0 {
			return Ok(result);
		}
		shift += 7;
		if shift >= 64 {
			return Err(Error::new(ErrorKind::Protocol, "varuint too long"));
		}
	}
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
	write_varuint(out, bytes.len() as u64);
	out.extend_from_slice(bytes);
}

pub fn read_bytes(cursor: &mut Cursor<'_>) -> Result<Vec<u8>, Error> {
	let len = usize::try_from(read_varuint(cursor)?)
		.map_err(|_| Error::new(ErrorKind::Protocol, "length too large for this platform"))?;
	cursor.read_exact(len)
}

pub fn write_path(out: &mut Vec<u8>, path: &Path) {
	write_bytes(out, path.to_string().as_bytes());
}

pub fn read_path(cursor: &mut Cursor<'_>) -> Result<Path, Error> {
	let bytes = read_bytes(cursor)?;
	let s = String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::Protocol, e.to_string()))?;
	Path::parse(&s)
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
	out.push(u8::from(value));
}

pub fn read_bool(cursor: &mut Cursor<'_>) -> Result<bool, Error> {
	Ok(cursor.read_byte()? != 0)
}

/// The observed-bytes encoding used by Get and IteratorGetValue: short data
/// is inlined and compared by equality; long data is reduced to a 16-byte
/// keyed hash and compared by recomputing it over the replayer's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrHash {
	Inline(Vec<u8>),
	Hash([u8; 16]),
}

fn keyed_hash(data: &[u8]) -> [u8; 16] {
	let hash = blake3::keyed_hash(&HASH_KEY, data);
	let mut out = [0u8; 16];
	out.copy_from_slice(&hash.as_bytes()[..16]);
	out
}

pub fn write_data_or_hash(out: &mut Vec<u8>, data: &[u8]) {
	if data.len() < INLINE_THRESHOLD {
		// data.len() < INLINE_THRESHOLD (17) here, so this always fits in a u8.
		#[allow(clippy::cast_possible_truncation)]
		out.push(data.len() as u8);
		out.extend_from_slice(data);
	} else {
		out.push(255);
		out.extend_from_slice(&keyed_hash(data));
	}
}

pub fn read_data_or_hash(cursor: &mut Cursor<'_>) -> Result<DataOrHash, Error> {
	let marker = cursor.read_byte()?;
	if marker < 255 {
		let bytes = cursor.read_exact(marker as usize)?;
		Ok(DataOrHash::Inline(bytes))
	} else {
		let bytes = cursor.read_exact(16)?;
		let mut hash = [0u8; 16];
		hash.copy_from_slice(&bytes);
		Ok(DataOrHash::Hash(hash))
	}
}

/// Compares a recorded `DataOrHash` against bytes observed during replay.
/// Any mismatch is `Stale`, never a protocol error — it signals the peers'
/// states have diverged, not that the stream is malformed.
pub fn verify_data_or_hash(recorded: &DataOrHash, actual: &[u8]) -> Result<(), Error> {
	let matches = match recorded {
		DataOrHash::Inline(bytes) => bytes.as_slice() == actual,
		DataOrHash::Hash(hash) => *hash == keyed_hash(actual),
	};
	if matches {
		Ok(())
	} else {
		Err(Error::new(ErrorKind::Stale, "observed bytes disagree with recorded transaction stream"))
	}
}

/// A forward-only byte cursor over the replay input. `read_byte`/`read_exact`
/// surface truncation as `Protocol` errors; they never panic on an
/// adversarial or corrupted stream.
pub struct Cursor<'a> {
	data: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Cursor { data, pos: 0 }
	}

	pub fn is_at_end(&self) -> bool {
		self.pos >= self.data.len()
	}

	pub fn read_byte(&mut self) -> Result<u8, Error> {
		let byte =
			*self.data.get(self.pos).ok_or_else(|| Error::new(ErrorKind::Protocol, "unexpected end of stream"))?;
		self.pos += 1;
		Ok(byte)
	}

	pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		let end = self
			.pos
			.checked_add(len)
			.ok_or_else(|| Error::new(ErrorKind::Protocol, "length overflow in transaction stream"))?;
		if end > self.data.len() {
			return Err(Error::new(ErrorKind::Protocol, "unexpected end of stream"));
		}
		let slice = self.data[self.pos..end].to_vec();
		self.pos = end;
		Ok(slice)
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
	use super::*;

	#[test]
	fn varuint_round_trip() {
		for value in [0u64, 1, 127, 128, 300, u64::MAX] {
			let mut buf = Vec::new();
			write_varuint(&mut buf, value);
			let mut cursor = Cursor::new(&buf);
			assert_eq!(read_varuint(&mut cursor).unwrap(), value);
		}
	}

	#[test]
	fn path_round_trip() {
		let path = Path::from_segments(["a", "b c"]);
		let mut buf = Vec::new();
		write_path(&mut buf, &path);
		let mut cursor = Cursor::new(&buf);
		assert_eq!(read_path(&mut cursor).unwrap(), path);
	}

	#[test]
	fn short_data_is_inlined() {
		let mut buf = Vec::new();
		write_data_or_hash(&mut buf, b"hello");
		assert_eq!(buf[0], 5);
		let mut cursor = Cursor::new(&buf);
		let doh = read_data_or_hash(&mut cursor).unwrap();
		assert!(verify_data_or_hash(&doh, b"hello").is_ok());
		assert!(verify_data_or_hash(&doh, b"world").is_err());
	}

	#[test]
	fn long_data_is_hashed() {
		let data = vec![7u8; 100];
		let mut buf = Vec::new();
		write_data_or_hash(&mut buf, &data);
		assert_eq!(buf[0], 255);
		assert_eq!(buf.len(), 17);
		let mut cursor = Cursor::new(&buf);
		let doh = read_data_or_hash(&mut cursor).unwrap();
		assert!(verify_data_or_hash(&doh, &data).is_ok());
		let mut tampered = data.clone();
		tampered[0] ^= 1;
		assert!(verify_data_or_hash(&doh, &tampered).is_err());
	}

	#[test]
	fn truncated_stream_is_a_protocol_error() {
		let mut cursor = Cursor::new(&[0x80]);
		assert!(read_varuint(&mut cursor).unwrap_err().is_protocol());
	}
}

// vim: ts=4
