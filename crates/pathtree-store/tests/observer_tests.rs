#![allow(clippy::unwrap_used, clippy::expect_used)]

use pathtree_core::Path;
use pathtree_store::{Database, OpenOptions};
use tempfile::TempDir;

fn temp_db() -> (Database, TempDir) {
	let dir = TempDir::new().expect("failed to create temp directory");
	let db = Database::open(dir.path().join("store.redb"), &OpenOptions::default())
		.expect("failed to open database");
	(db, dir)
}

#[tokio::test]
async fn subscriber_receives_coalesced_commit_changes() {
	let (db, _dir) = temp_db();

	let matcher = Path::from_segments(["users"]).to_matcher().append_any_element();
	let (mut rx, _sub) = db.observe(matcher);
	rx.recv().await.expect("priming receive");

	db.write(|tx| {
		tx.create_map(&Path::from_segments(["users"]))?;
		tx.put(&Path::from_segments(["users", "alice"]), b"hi")?;
		Ok(())
	})
	.await
	.expect("write");

	let changes = rx.recv().await.expect("change notification");
	assert_eq!(changes.iter().count(), 1, "only the matched path should reach this subscriber");
}

#[tokio::test]
async fn rolled_back_transaction_notifies_nobody() {
	let (db, _dir) = temp_db();

	let matcher = Path::root().to_matcher().append_any_subpath();
	let (mut rx, _sub) = db.observe(matcher);
	rx.recv().await.expect("priming receive");

	let result = db.write(|tx| tx.put(&Path::from_segments(["missing", "x"]), b"y")).await;
	assert!(result.is_err());

	db.write(|tx| tx.create_map(&Path::from_segments(["ok"]))).await.expect("write");

	let changes = rx.recv().await.expect("only the successful commit should be observed");
	assert_eq!(changes.iter().next().unwrap().path, Path::from_segments(["ok"]));
}

#[tokio::test]
async fn cancel_closes_subscription() {
	let (db, _dir) = temp_db();

	let matcher = Path::root().to_matcher().append_any_subpath();
	let (mut rx, sub) = db.observe(matcher);
	rx.recv().await.expect("priming receive");
	sub.cancel();

	assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn deletion_is_broadcast_to_every_subscriber_regardless_of_matcher() {
	let (db, _dir) = temp_db();
	db.write(|tx| tx.create_map(&Path::from_segments(["a"]))).await.expect("write");

	let unrelated_matcher = Path::from_segments(["z"]).to_matcher();
	let (mut rx, _sub) = db.observe(unrelated_matcher);
	rx.recv().await.expect("priming receive");

	db.write(|tx| tx.delete(&Path::from_segments(["a"]))).await.expect("write");

	let changes = rx.recv().await.expect("deletes bypass the matcher filter");
	assert_eq!(changes.iter().next().unwrap().path, Path::from_segments(["a"]));
}
