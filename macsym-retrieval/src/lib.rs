//! Symbol archive retrieval for `macsym`.
//!
//! A retrieval request moves through a fixed sequence of states:
//!
//! ```txt
//! Pending -> FetchingMetadata -> ChunkedTransfer | SimpleTransfer
//!         -> Validating -> Extracting -> Done
//! ```
//!
//! with failure reachable from any state. The metadata fetch (a HEAD
//! request) decides the transfer mode: when the size is known and the server
//! honors byte ranges, the archive is fetched as concurrent range chunks
//! into per-chunk temporary files and merged strictly by chunk index;
//! otherwise a single streamed GET is used. Every chunk retries with
//! exponential backoff before the whole transfer fails, and progress (bytes
//! done, speed, ETA) is reported after every chunk completion.
//!
//! Validation checks the archive's magic bytes and, for zip archives, the
//! central directory. Extraction expands the archive into the version
//! directory, preserving the archive file on failure. Source selection
//! walks the primary tier before the backup tier; only after both are
//! exhausted does retrieval fail hard.

#![warn(missing_docs)]

mod archive;
mod chunk;
mod downloader;
mod error;
mod fetch;
mod progress;

pub use crate::archive::*;
pub use crate::chunk::*;
pub use crate::downloader::*;
pub use crate::error::*;
pub use crate::fetch::*;
pub use crate::progress::*;
