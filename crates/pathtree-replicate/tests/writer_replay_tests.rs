#![allow(clippy::unwrap_used, clippy::expect_used)]

use pathtree_core::Path;
use pathtree_replicate::{replay, Writer};
use pathtree_store::{Database, OpenOptions};
use tempfile::TempDir;

fn temp_db() -> (Database, TempDir) {
	let dir = TempDir::new().expect("failed to create temp directory");
	let db = Database::open(dir.path().join("store.redb"), &OpenOptions::default()).expect("failed to open database");
	(db, dir)
}

#[tokio::test]
async fn replayed_mutations_are_visible_on_the_peer() {
	let (primary, _dir1) = temp_db();
	let (peer, _dir2) = temp_db();

	let stream = primary
		.write(|tx| {
			let mut w = Writer::new(tx);
			w.create_map(&Path::from_segments(["users"]))?;
			w.put(&Path::from_segments(["users", "alice"]), b"hello")?;
			Ok(w.finish())
		})
		.await
		.expect("record on primary");

	replay(&peer, stream).await.expect("replay on peer");

	let value = peer.read(|tx| tx.get(&Path::from_segments(["users", "alice"]))).await.expect("read");
	assert_eq!(value, b"hello");
}

#[tokio::test]
async fn replay_detects_staleness_when_peer_already_has_the_key() {
	let (primary, _dir1) = temp_db();
	let (peer, _dir2) = temp_db();

	let stream = primary
		.write(|tx| {
			let mut w = Writer::new(tx);
			w.create_map(&Path::from_segments(["k"]))?;
			Ok(w.finish())
		})
		.await
		.expect("record on primary");

	peer.write(|tx| tx.create_map(&Path::from_segments(["k"]))).await.expect("peer already has k");

	let result = replay(&peer, stream).await;
	assert!(result.unwrap_err().is_conflict());
}

#[tokio::test]
async fn replay_verifies_recorded_observations_and_detects_drift() {
	let (primary, _dir1) = temp_db();
	let (peer, _dir2) = temp_db();

	primary.write(|tx| tx.put(&Path::from_segments(["x"]), b"same")).await.expect("seed primary");
	peer.write(|tx| tx.put(&Path::from_segments(["x"]), b"same")).await.expect("seed peer");

	let stream = primary
		.write(|tx| {
			let mut w = Writer::new(tx);
			w.get(&Path::from_segments(["x"]))?;
			Ok(w.finish())
		})
		.await
		.expect("record a Get observation");

	replay(&peer, stream).await.expect("matching observation replays cleanly");

	// Now diverge the peer and recreate the exact same recorded stream.
	let (primary2, _dir3) = temp_db();
	let (peer2, _dir4) = temp_db();
	primary2.write(|tx| tx.put(&Path::from_segments(["x"]), b"same")).await.expect("seed primary2");
	peer2.write(|tx| tx.put(&Path::from_segments(["x"]), b"different")).await.expect("seed peer2 differently");

	let stream2 = primary2
		.write(|tx| {
			let mut w = Writer::new(tx);
			w.get(&Path::from_segments(["x"]))?;
			Ok(w.finish())
		})
		.await
		.expect("record a Get observation");

	let result = replay(&peer2, stream2).await;
	assert!(result.unwrap_err().is_stale());
}

#[tokio::test]
async fn replay_walks_iterator_records_to_completion() {
	let (primary, _dir1) = temp_db();
	let (peer, _dir2) = temp_db();

	for db in [&primary, &peer] {
		db.write(|tx| {
			tx.create_map(&Path::from_segments(["m"]))?;
			tx.put(&Path::from_segments(["m", "a"]), b"1")?;
			tx.put(&Path::from_segments(["m", "b"]), b"2")?;
			Ok(())
		})
		.await
		.expect("seed identical trees");
	}

	let stream = primary
		.write(|tx| {
			let mut w = Writer::new(tx);
			let idx = w.new_iterator(&Path::from_segments(["m"]))?;
			while !w.iterator_is_done(idx)? {
				w.iterator_get_key(idx)?;
				w.iterator_get_value(idx)?;
				w.iterator_next(idx)?;
			}
			Ok(w.finish())
		})
		.await
		.expect("record an iteration");

	replay(&peer, stream).await.expect("identical trees replay the iteration cleanly");
}

#[tokio::test]
async fn put_over_an_existing_key_records_an_implicit_get_that_catches_a_stale_peer() {
	let (primary, _dir1) = temp_db();
	let (peer, _dir2) = temp_db();

	for db in [&primary, &peer] {
		db.write(|tx| tx.put(&Path::from_segments(["k"]), b"original")).await.expect("seed identical value");
	}

	// Peer diverges before replay: it now holds a different value for "k"
	// than what the writer observed as "the prior value" when it recorded
	// its own overwrite.
	peer.write(|tx| tx.put(&Path::from_segments(["k"]), b"changed-on-peer")).await.expect("diverge peer");

	let stream = primary
		.write(|tx| {
			let mut w = Writer::new(tx);
			w.put(&Path::from_segments(["k"]), b"new-from-primary")?;
			Ok(w.finish())
		})
		.await
		.expect("record an overwrite");

	let result = replay(&peer, stream).await;
	assert!(result.unwrap_err().is_stale());
}

#[tokio::test]
async fn replay_rejects_an_unknown_tag() {
	let (peer, _dir) = temp_db();
	let result = replay(&peer, vec![99]).await;
	assert!(result.unwrap_err().is_protocol());
}
