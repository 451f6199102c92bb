//! Deduplicating, concurrency-bounded resolution.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use macsym_common::Arch;
use macsym_scanner::{CrashLineKind, ImageTable, ThreadBlock};

use crate::resolver::{Resolve, ResolutionRequest, ResolverOutput};

/// The outcome of resolving one report line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    /// Exit code of the resolver invocation serving this line.
    pub status: Option<i32>,
    /// The extracted symbol text; empty when the tool printed nothing.
    pub resolved: String,
    /// Captured standard error, recorded per line.
    pub error: String,
}

impl ResolutionResult {
    /// The text reassembly should render for this line, if any.
    ///
    /// Stderr wins over stdout so a failing invocation surfaces its
    /// diagnostic instead of an empty symbol.
    pub fn display_text(&self) -> Option<&str> {
        if !self.error.trim().is_empty() {
            Some(self.error.trim())
        } else if !self.resolved.is_empty() {
            Some(&self.resolved)
        } else {
            None
        }
    }
}

/// Resolves the eligible frames of a report's thread blocks.
pub struct SymbolizationEngine<R> {
    resolver: Arc<R>,
    semaphore: Arc<Semaphore>,
}

impl<R: Resolve + 'static> SymbolizationEngine<R> {
    /// Creates an engine over a resolver, bounding concurrent invocations.
    ///
    /// The bound protects finite OS resources: every invocation holds a
    /// process-table slot and three pipes.
    pub fn new(resolver: R, max_concurrent: usize) -> Self {
        SymbolizationEngine {
            resolver: Arc::new(resolver),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Resolves all requests, invoking the tool once per distinct
    /// `(target, load)` pair, and fans each result back to every line index
    /// of its equivalence class.
    ///
    /// Failed invocations are recorded on their lines and never abort
    /// sibling invocations; partial symbolication succeeds.
    pub async fn resolve_requests(
        &self,
        requests: Vec<ResolutionRequest>,
    ) -> HashMap<usize, ResolutionResult> {
        // Group by equivalence key. Insertion order is kept so invocation
        // order is deterministic even though completion order is not.
        let mut classes: IndexMap<(String, String), (ResolutionRequest, Vec<usize>)> =
            IndexMap::new();
        for request in requests {
            let key = request.key();
            match classes.get_mut(&key) {
                Some((_, line_indexes)) => line_indexes.push(request.line_index),
                None => {
                    let line_index = request.line_index;
                    classes.insert(key, (request, vec![line_index]));
                }
            }
        }

        tracing::debug!(unique = classes.len(), "resolving deduplicated requests");

        let mut tasks = JoinSet::new();
        for (key, (request, _)) in classes.iter() {
            let key = key.clone();
            let request = request.clone();
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&self.semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = resolver.resolve(&request).await;
                (key, outcome)
            });
        }

        let mut outputs: HashMap<(String, String), ResolverOutput> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    tracing::error!(%join_error, "resolver task panicked");
                    continue;
                }
            };

            let output = match outcome {
                Ok(output) => output,
                Err(error) => {
                    tracing::warn!(address = %key.0, load = %key.1, %error, "resolver failed to run");
                    ResolverOutput {
                        status: None,
                        stdout: String::new(),
                        stderr: error.to_string(),
                    }
                }
            };
            outputs.insert(key, output);
        }

        let mut results = HashMap::new();
        for (key, (_, line_indexes)) in classes {
            let output = match outputs.get(&key) {
                Some(output) => output,
                None => continue,
            };
            for line_index in line_indexes {
                results.insert(
                    line_index,
                    ResolutionResult {
                        status: output.status,
                        resolved: output.useful_line().to_owned(),
                        error: output.stderr.clone(),
                    },
                );
            }
        }

        results
    }
}

/// Builds resolution requests for the eligible frame lines of the first
/// `max_blocks` blocks.
///
/// A line is eligible iff its image's debug file, its load address and its
/// target address are all known; anything else stays unresolved and falls
/// back to raw text in the output. Already symbolized frames are left
/// alone.
pub fn build_requests(
    blocks: &[ThreadBlock],
    images: &ImageTable,
    arch: Arch,
    max_blocks: usize,
) -> Vec<ResolutionRequest> {
    let mut requests = Vec::new();

    for block in blocks.iter().take(max_blocks) {
        for line in &block.lines {
            let (image_name, load_address, target_address) = match line.kind {
                CrashLineKind::Stack(ref frame) => (
                    frame.image_name.as_str(),
                    Some(frame.load_address.as_str()),
                    frame.target_address.as_str(),
                ),
                CrashLineKind::Diagnostic(ref frame) if !frame.is_symbolized() => {
                    (frame.image_name.as_str(), None, frame.target_address.as_str())
                }
                _ => continue,
            };

            let image = images
                .by_name(image_name)
                .or_else(|| load_address.and_then(|addr| images.by_load_address(addr)));
            let image = match image {
                Some(image) => image,
                None => {
                    tracing::debug!(line = line.index, image = image_name, "image not in table");
                    continue;
                }
            };

            let debug_path = match image.debug_path.as_ref() {
                Some(path) => path.clone(),
                // No debug file was found for this binary; skipped, no
                // retry, the line keeps its raw text.
                None => continue,
            };

            let load_address = load_address
                .unwrap_or(image.load_address.as_str())
                .to_owned();
            if load_address.is_empty() || target_address.is_empty() {
                continue;
            }

            requests.push(ResolutionRequest {
                line_index: line.index,
                arch: image.arch.unwrap_or(arch),
                debug_path,
                load_address,
                target_address: target_address.to_owned(),
            });
        }
    }

    requests
}
