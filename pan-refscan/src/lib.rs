//! Reference and redundancy analysis for Panorama / PAN-OS configurations.
//!
//! Given a configuration export and one or more address object names, this
//! library answers where each object is used, which other objects carry the
//! same IP value, where a consolidated object should live, and which commands
//! would fold the duplicates into it.
//!
//! # Architecture
//!
//! ## Ingestion
//!
//! - [`ingest`] — Auto-detect and convert set-statement or markup exports
//!   into [`model::EntityRecord`]s
//! - [`store`] — Fold records into an immutable, indexed [`store::EntityStore`]
//! - [`session`] — Reuse built stores across queries while files are unchanged
//!
//! ## Analysis
//!
//! - [`resolver`] — Direct, membership, nested and indirect references
//! - [`redundancy`] — IP normalization and equivalence classes
//! - [`scope`] — Canonical scope for a consolidated object
//! - [`cleanup`] — Remediation command plans
//! - [`copy`] — Copy an address object and wire the copy into its users
//! - [`hierarchy`] — Group nesting, root groups, loops and cross-scope uses
//! - [`analysis`] — Per-target reports and the store-wide redundancy pass
//!
//! ## Reporting
//!
//! - [`report`] — Terminal-friendly colored output
//!
//! ## Utilities
//!
//! - [`config`] — Analyzer settings and rule header patterns
//! - [`cancel`] — Cooperative cancellation with optional deadline
//! - [`progress`] — Non-blocking progress delivery
//!
//! # Workflow
//!
//! 1. **Ingest** the export once (cached per session)
//! 2. **Resolve** every reference to the target
//! 3. **Detect** redundant peers by normalized IP value
//! 4. **Decide** the canonical scope
//! 5. **Synthesize** the cleanup plan
//!
//! # Examples
//!
//! ```ignore
//! use pan_refscan::analysis::{analyze_target, AnalysisOptions};
//! use pan_refscan::cancel::CancelToken;
//! use pan_refscan::config::AnalyzerConfig;
//! use pan_refscan::progress::ProgressReporter;
//! use pan_refscan::session::Session;
//!
//! let session = Session::new(AnalyzerConfig::embedded())?;
//! let cancel = CancelToken::new();
//! let store = session.load("running-config.set".as_ref(), &cancel, &ProgressReporter::silent())?;
//! let report = analyze_target(&store, "web", &AnalysisOptions { with_cleanup: true }, &cancel)?;
//! println!("direct: {}, indirect: {}", report.direct_rules.len(), report.indirect_rules.len());
//! ```
//!
//! # Built on panconf-core
//!
//! Generic markup scanning, statement tokenizing and the TTL cache live in
//! `panconf-core`. Everything PAN-OS specific is in this crate.

pub mod analysis;
pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod copy;
pub mod hierarchy;
pub mod ingest;
pub mod model;
pub mod progress;
pub mod redundancy;
pub mod report;
pub mod resolver;
pub mod scope;
pub mod session;
pub mod store;
