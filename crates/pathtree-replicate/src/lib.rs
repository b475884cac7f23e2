//! Transaction-stream codec and replay engine: lets one peer record every
//! operation performed inside a write transaction and ship it to another,
//! which re-executes the mutations and verifies every observation against
//! its own local state before committing.

pub mod codec;
pub mod replay;
pub mod writer;

pub use codec::DataOrHash;
pub use replay::{replay, ReplayOutcome};
pub use writer::Writer;

// vim: ts=4
