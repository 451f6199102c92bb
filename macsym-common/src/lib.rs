//! Common functionality for `macsym`.
//!
//! This crate exposes the leaf types shared by all pipeline stages:
//!
//!  - [`Arch`]: The CPU architecture a crash report was captured on.
//!  - [`AppVersion`]: A dotted application version with numeric ordering.
//!  - [`Config`]: The configuration value handed to the pipeline at
//!    construction time.
//!
//! All types implement `serde::Serialize` and `serde::Deserialize`, so a
//! configuration file can be loaded with any serde format crate.

#![warn(missing_docs)]

mod config;
mod types;

pub use crate::config::*;
pub use crate::types::*;
