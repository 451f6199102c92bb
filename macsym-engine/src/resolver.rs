//! The injectable resolver seam.
//!
//! The engine never decodes debug information itself; it shells out to a
//! platform tool (`atos` on macOS) and treats it as a black box keyed by
//! architecture, debug file, load address and target address. The seam is a
//! trait so tests can substitute a canned resolver and exercise the
//! engine's dedup and concurrency logic without subprocesses.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use macsym_common::{Arch, ResolverConfig};

/// The minimal unit handed to the external resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Report line this request resolves; the correlation key for fan-in.
    pub line_index: usize,
    /// Architecture passed to the resolver.
    pub arch: Arch,
    /// Resolver-ready debug file of the binary.
    pub debug_path: PathBuf,
    /// Address the binary was loaded at.
    pub load_address: String,
    /// The instruction address to resolve.
    pub target_address: String,
}

impl ResolutionRequest {
    /// The equivalence key: requests sharing `(target, load)` resolve to the
    /// same symbol and are invoked exactly once.
    pub fn key(&self) -> (String, String) {
        (self.target_address.clone(), self.load_address.clone())
    }
}

/// Everything observed from one resolver invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolverOutput {
    /// Exit code; `None` when the invocation timed out or was killed.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ResolverOutput {
    /// Extracts the symbol text from the resolver's stdout.
    ///
    /// The tool may print diagnostic noise around the answer; the useful
    /// line is reliably the longest one. On ties the first longest line
    /// wins, and empty stdout yields an empty string rather than an error.
    pub fn useful_line(&self) -> &str {
        let mut best = "";
        for line in self.stdout.lines() {
            if line.len() > best.len() {
                best = line;
            }
        }
        best
    }
}

/// Maps one address to a symbol via an external tool.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolves a single request, returning whatever the tool produced.
    ///
    /// A non-zero exit is not an `Err`: the output (and its exit status) is
    /// returned as-is and recorded per line. `Err` is reserved for failing
    /// to run the tool at all.
    async fn resolve(&self, request: &ResolutionRequest) -> io::Result<ResolverOutput>;
}

/// The production resolver: shells out to `atos` (or a compatible tool).
///
/// Invoked as `<tool> -arch <arch> -o <debug file> -l <load address>
/// <target address>`; the tool must be on `PATH`.
#[derive(Clone, Debug)]
pub struct AtosResolver {
    tool: PathBuf,
    timeout: Duration,
}

impl AtosResolver {
    /// Creates a resolver from the configuration.
    pub fn new(config: &ResolverConfig) -> Self {
        AtosResolver {
            tool: PathBuf::from(&config.tool),
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Resolve for AtosResolver {
    async fn resolve(&self, request: &ResolutionRequest) -> io::Result<ResolverOutput> {
        let output = Command::new(&self.tool)
            .arg("-arch")
            .arg(request.arch.name())
            .arg("-o")
            .arg(&request.debug_path)
            .arg("-l")
            .arg(&request.load_address)
            .arg(&request.target_address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(output) => {
                let output = output?;
                Ok(ResolverOutput {
                    status: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            // A wedged tool must not stall the run; the line stays
            // unresolved and siblings continue.
            Err(_) => Ok(ResolverOutput {
                status: None,
                stdout: String::new(),
                stderr: format!(
                    "resolver timed out after {}s for {}",
                    self.timeout.as_secs(),
                    request.target_address
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_useful_line_is_first_longest() {
        let output = ResolverOutput {
            status: Some(0),
            stdout: "noise\nmain (in Webex) (app.cpp:42)\nnoise again\n".into(),
            stderr: String::new(),
        };
        assert_eq!(output.useful_line(), "main (in Webex) (app.cpp:42)");
    }

    #[test]
    fn test_useful_line_of_empty_stdout_is_empty() {
        let output = ResolverOutput::default();
        assert_eq!(output.useful_line(), "");
    }

    #[test]
    fn test_useful_line_tie_keeps_first() {
        let output = ResolverOutput {
            status: Some(0),
            stdout: "aaa\nbbb\n".into(),
            stderr: String::new(),
        };
        assert_eq!(output.useful_line(), "aaa");
    }
}
