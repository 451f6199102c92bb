//! `macsym` automatically symbolicates macOS crash reports: it scans the
//! report text, locates or fetches the matching debug-symbol archive for
//! the crashing binary version, resolves every stack address through the
//! platform resolver tool, and reassembles the result into readable,
//! crashed-thread-first stack traces.
//!
//! # What's in the package
//!
//! The work is split across largely independent crates, re-exported here:
//!
//! - [`scanner`]: multi-dialect crash-report scanning into typed lines,
//!   thread blocks and the binary image table.
//! - [`store`]: the persistent symbol cache with version eviction and
//!   cross-process lock files.
//! - [`retrieval`]: chunked parallel archive downloads with retry,
//!   fallback, validation and extraction.
//! - [`engine`]: deduplicating, concurrency-bounded invocation of the
//!   external resolver.
//! - [`common`]: shared types and the configuration object.
//!
//! This crate adds the [`Symbolizer`] pipeline driver tying the stages
//! together.
//!
//! # Usage
//!
//! ```no_run
//! use macsym::{Config, Symbolizer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let symbolizer = Symbolizer::new(Config::default())?;
//! let report = symbolizer
//!     .symbolize("report.crash", "44.10.0.30800", "x86_64", false)
//!     .await?;
//!
//! println!("{}", report.title);
//! for block in &report.blocks {
//!     for line in block {
//!         println!("{line}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
mod pipeline;
mod reassembly;

#[doc(inline)]
pub use macsym_common as common;
#[doc(inline)]
pub use macsym_engine as engine;
#[doc(inline)]
pub use macsym_retrieval as retrieval;
#[doc(inline)]
pub use macsym_scanner as scanner;
#[doc(inline)]
pub use macsym_store as store;

pub use macsym_common::Config;

pub use crate::error::*;
pub use crate::pipeline::*;
pub use crate::reassembly::*;
