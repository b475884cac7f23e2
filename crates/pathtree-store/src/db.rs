use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pathtree_core::{Error, ErrorKind, Matcher, ObservedChanges};
use redb::{ReadableDatabase, ReadableTable};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine;
use crate::error::from_redb_error;
use crate::observer::{ObserverHub, Subscription};
use crate::transaction::{ReadTransaction, WriteTransaction};

/// Tuning knobs for opening a database file, mirroring the original's
/// `Options` wrapper around the backing engine's own open options.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
	/// Page cache size in bytes, forwarded to `redb::Builder::set_cache_size`.
	pub cache_size_bytes: Option<usize>,
}

struct Inner {
	path: Arc<PathBuf>,
	db: redb::Database,
	observer: Arc<ObserverHub>,
	next_tx_id: AtomicU64,
}

/// The store's entry point: opens the backing file, routes `read`/`write`
/// closures into transactions, and exposes `observe`.
#[derive(Clone)]
pub struct Database {
	inner: Arc<Inner>,
}

impl Database {
	/// Opens (creating if absent) the database file at `path`, then ensures
	/// the root map's child-count entry exists so `Size(root)` reads zero
	/// rather than relying on the get-or-default fallback on a cold file.
	pub fn open(path: impl AsRef<FsPath>, options: &OpenOptions) -> Result<Self, Error> {
		let path = path.as_ref().to_path_buf();
		let mut builder = redb::Database::builder();
		if let Some(bytes) = options.cache_size_bytes {
			builder.set_cache_size(bytes);
		}
		let db = builder.create(&path).map_err(|e| Error::new(ErrorKind::Engine, e.to_string()))?;

		{
			let tx = db.begin_write().map_err(from_redb_error)?;
			{
				let mut sizes = tx.open_table(engine::SIZES).map_err(from_redb_error)?;
				if sizes.get("").map_err(from_redb_error)?.is_none() {
					sizes.insert("", 0u64).map_err(from_redb_error)?;
				}
			}
			tx.commit().map_err(from_redb_error)?;
		}

		info!(path = %path.display(), "opened database");
		Ok(Database {
			inner: Arc::new(Inner { path: Arc::new(path), db, observer: ObserverHub::new(), next_tx_id: AtomicU64::new(0) }),
		})
	}

	/// Runs `f` against a fresh write transaction on a blocking thread,
	/// committing and broadcasting its changes on `Ok`, rolling back on
	/// `Err`. Never holds the store's async runtime hostage on redb's
	/// synchronous I/O.
	pub async fn write<F, T>(&self, f: F) -> Result<T, Error>
	where
		F: FnOnce(&mut WriteTransaction) -> Result<T, Error> + Send + 'static,
		T: Send + 'static,
	{
		self.write_cancellable(None, f).await
	}

	pub async fn write_cancellable<F, T>(&self, cancel: Option<CancellationToken>, f: F) -> Result<T, Error>
	where
		F: FnOnce(&mut WriteTransaction) -> Result<T, Error> + Send + 'static,
		T: Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		tokio::task::spawn_blocking(move || {
			let id = inner.next_tx_id.fetch_add(1, Ordering::Relaxed);
			let raw_tx = inner.db.begin_write().map_err(from_redb_error)?;
			let mut tx = WriteTransaction::new(id, raw_tx, Arc::clone(&inner.path), cancel);
			match f(&mut tx) {
				Ok(value) => {
					let changes = tx.commit()?;
					inner.observer.broadcast(&changes);
					Ok(value)
				}
				Err(e) => {
					tx.rollback();
					Err(e)
				}
			}
		})
		.await
		.map_err(|e| Error::new(ErrorKind::Engine, format!("write task panicked: {e}")))?
	}

	pub async fn read<F, T>(&self, f: F) -> Result<T, Error>
	where
		F: FnOnce(&ReadTransaction) -> Result<T, Error> + Send + 'static,
		T: Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		tokio::task::spawn_blocking(move || {
			let id = inner.next_tx_id.fetch_add(1, Ordering::Relaxed);
			let raw_tx = inner.db.begin_read().map_err(from_redb_error)?;
			let tx = ReadTransaction::new(id, raw_tx, Arc::clone(&inner.path));
			f(&tx)
		})
		.await
		.map_err(|e| Error::new(ErrorKind::Engine, format!("read task panicked: {e}")))?
	}

	/// Subscribes to post-commit changes matched by `matcher`. See
	/// [`ObserverHub::observe`].
	pub fn observe(&self, matcher: Matcher) -> (mpsc::Receiver<ObservedChanges>, Subscription) {
		self.inner.observer.observe(matcher)
	}

	/// The on-disk size of the backing file, recovered from the original's
	/// `GetDBFileSize`.
	pub fn file_size(&self) -> Result<u64, Error> {
		std::fs::metadata(self.inner.path.as_path()).map(|m| m.len()).map_err(|e| Error::new(ErrorKind::Engine, e.to_string()))
	}

	pub fn close(self) {
		debug!(path = %self.inner.path.display(), "closing database");
	}
}

// vim: ts=4
