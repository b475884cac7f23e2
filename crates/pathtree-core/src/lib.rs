//! Path-addressing, matcher, error taxonomy and observed-change types shared
//! by the store and replication crates.

pub mod changes;
pub mod error;
pub mod matcher;
pub mod path;

pub use changes::{ChangeKind, ObservedChange, ObservedChanges};
pub use error::{Error, ErrorKind};
pub use matcher::Matcher;
pub use path::Path;

// vim: ts=4
