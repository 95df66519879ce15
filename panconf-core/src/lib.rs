//! Generic primitives for reading firewall configuration exports.
//!
//! - [`scanner`] walks tag-delimited exports and captures only the named
//!   entries beneath requested collection paths.
//! - [`statement`] tokenizes line-oriented `set` statements.
//! - [`ttl_cache`] is a bounded, thread-safe cache with a stoppable sweep.
//!
//! Nothing here knows about address objects or rules; that lives in the
//! analysis crate built on top.

pub mod scanner;
pub mod statement;
pub mod tree;
pub mod ttl_cache;

pub use scanner::{scan_sections, EntryScope, ScanError, ScanSummary, ScannedEntry, SectionTarget};
pub use statement::{quote_token, render_list, tokenize, Token};
pub use tree::XmlNode;
pub use ttl_cache::{SweepHandle, TtlCache};
