//! Crash-report scanning for `macsym`.
//!
//! A crash report arrives as plain text in one of three dialects: the
//! canonical macOS crash-report text, a JSON incident report (normalized to
//! text by an external collaborator before scanning), or the spin/hang
//! diagnostic variant. This crate turns such text into a structured
//! [`ScanReport`]:
//!
//!  - every line becomes a typed [`CrashLine`] with its original index,
//!  - lines are grouped into ordered [`ThreadBlock`]s with the crashed
//!    thread promoted to the front,
//!  - binary image rows become an identity-keyed [`ImageTable`],
//!  - a version embedded in the crashing application's image row is
//!    surfaced as the report's authoritative version.
//!
//! Classification is driven entirely by the patterns in
//! [`PatternConfig`](macsym_common::PatternConfig), so report dialects can
//! evolve without code changes.
//!
//! # Example
//!
//! ```
//! use macsym_common::PatternConfig;
//! use macsym_scanner::CrashScanner;
//!
//! let scanner = CrashScanner::new(&PatternConfig::default()).unwrap();
//! let report = scanner.scan(
//!     "Thread 0 Crashed:\n\
//!      0   AppKit    0x00007fff204e3a24 0x7fff204ae000 + 219684\n\
//!      \n\
//!      Binary Images:\n\
//!      0x7fff204ae000 - 0x7fff20552fff com.apple.AppKit (6.9) <11111111-2222-3333-4444-555555555555> /System/Library/Frameworks/AppKit.framework/AppKit\n",
//! ).unwrap();
//! assert_eq!(report.blocks.len(), 1);
//! assert_eq!(report.images.len(), 1);
//! ```

#![warn(missing_docs)]

mod classify;
mod dialect;
mod error;
mod line;
mod scanner;

pub use crate::classify::*;
pub use crate::dialect::*;
pub use crate::error::*;
pub use crate::line::*;
pub use crate::scanner::*;
