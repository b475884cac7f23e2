//! Transactional path-addressed store with change observation, backed by
//! `redb`.

pub mod db;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod observer;
pub mod transaction;

pub use db::{Database, OpenOptions};
pub use iterator::ChildIterator;
pub use observer::Subscription;
pub use transaction::{ReadTransaction, WriteTransaction};

// vim: ts=4
