//! Typed crash-report lines and the binary image table.

use std::path::PathBuf;

use debugid::DebugId;
use indexmap::IndexMap;

use macsym_common::Arch;

/// A thread block header, such as `Thread 5 Crashed:`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadHeader {
    /// Zero-based thread index reported by the OS.
    pub thread_index: u32,
    /// Whether this thread was executing when the process died.
    pub crashed: bool,
    /// The remainder of the header line (dispatch queue, thread name).
    pub name: String,
}

/// An unresolved stack frame in the canonical layout
/// `<idx> <image> <target> <load> + <offset>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    /// Frame position within its thread.
    pub frame_index: u32,
    /// Name of the binary image the frame lies in.
    pub image_name: String,
    /// The instruction address to resolve.
    pub target_address: String,
    /// The address the image was mapped at.
    pub load_address: String,
}

/// A frame that already carries symbol text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolizedFrame {
    /// Frame position within its thread.
    pub frame_index: u32,
    /// Name of the binary image the frame lies in.
    pub image_name: String,
    /// The instruction address.
    pub target_address: String,
    /// The symbol text present in the report.
    pub symbol: String,
}

/// A frame in the spin/hang diagnostic dialect:
/// `<indent><idx> <symbol> (<image> + <off>) [<address>]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticFrame {
    /// Leading whitespace, preserved for output.
    pub indent: String,
    /// Frame position within its group.
    pub frame_index: u32,
    /// Symbol text; empty or `???` when the report could not resolve it.
    pub symbol: String,
    /// Name of the binary image the frame lies in.
    pub image_name: String,
    /// The instruction address to resolve.
    pub target_address: String,
}

impl DiagnosticFrame {
    /// Whether the report already resolved this frame.
    pub fn is_symbolized(&self) -> bool {
        !self.symbol.trim().is_empty() && self.symbol.trim() != "???"
    }
}

/// One row of the binary image table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryRow {
    /// Start (load) address of the mapped image.
    pub load_address: String,
    /// End address of the mapped image.
    pub end_address: String,
    /// The binary name column, possibly prefixed with `+` for user code.
    pub name: String,
    /// The parenthesized detail column (version or architecture).
    pub detail: String,
    /// Image UUID; some dialects omit it.
    pub uuid: Option<DebugId>,
    /// On-disk path of the binary.
    pub path: String,
}

/// The typed payload of one classified report line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrashLineKind {
    /// An empty or whitespace-only line; terminates the block in progress.
    Blank,
    /// A header field such as `OS Version: macOS 13.2 (22D49)`.
    Info {
        /// The matched header identifier, including the trailing colon.
        key: String,
        /// The trimmed remainder of the line.
        value: String,
    },
    /// A thread block header.
    Thread(ThreadHeader),
    /// An unresolved stack frame.
    Stack(StackFrame),
    /// An already-symbolicated stack frame.
    Symbolized(SymbolizedFrame),
    /// A row of the binary image table.
    Binary(BinaryRow),
    /// A spin/hang diagnostic frame.
    Diagnostic(DiagnosticFrame),
    /// Anything else; dropped from further processing.
    Other,
}

/// One line of a crash report, classified.
///
/// `index` is the line's position in the original report and the sole
/// correlation key used to merge resolver output back in. It is preserved
/// end to end and never reassigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrashLine {
    /// Zero-based position in the original report.
    pub index: usize,
    /// The raw line with the trailing newline removed.
    pub text: String,
    /// The classified payload.
    pub kind: CrashLineKind,
}

impl CrashLine {
    /// Whether this line is a stack or diagnostic frame that may need
    /// resolution.
    pub fn is_frame(&self) -> bool {
        matches!(
            self.kind,
            CrashLineKind::Stack(_) | CrashLineKind::Symbolized(_) | CrashLineKind::Diagnostic(_)
        )
    }
}

/// One binary referenced by the report, merged from its image table row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryImage {
    /// Image UUID, if the dialect carries one.
    pub uuid: Option<DebugId>,
    /// The file name of the binary (base name of its path).
    pub name: String,
    /// The name column of the image row; used as a fallback search name.
    pub name_from_binary: String,
    /// Start address the image was mapped at.
    pub load_address: String,
    /// Architecture revealed by the image row, if any.
    pub arch: Option<Arch>,
    /// Path of the matching debug file, once located.
    pub debug_path: Option<PathBuf>,
}

impl BinaryImage {
    /// The identity key of this image: the UUID when present, the load
    /// address otherwise. Unique per (version, architecture) pair.
    pub fn identity_key(&self) -> String {
        match self.uuid {
            Some(uuid) => uuid.to_string(),
            None => self.load_address.clone(),
        }
    }
}

/// The binary image table of one report, in row order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageTable {
    images: IndexMap<String, BinaryImage>,
}

impl ImageTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an image unless its identity is already present.
    pub fn insert(&mut self, image: BinaryImage) {
        self.images.entry(image.identity_key()).or_insert(image);
    }

    /// Looks up an image by identity key.
    pub fn get(&self, identity_key: &str) -> Option<&BinaryImage> {
        self.images.get(identity_key)
    }

    /// Looks up an image by its load address.
    pub fn by_load_address(&self, load_address: &str) -> Option<&BinaryImage> {
        self.images
            .values()
            .find(|image| image.load_address == load_address)
    }

    /// Looks up an image by binary name, falling back to the image row's
    /// name column.
    pub fn by_name(&self, name: &str) -> Option<&BinaryImage> {
        self.images
            .values()
            .find(|image| image.name == name)
            .or_else(|| {
                self.images
                    .values()
                    .find(|image| image.name_from_binary == name)
            })
    }

    /// Records the located debug file for an image.
    pub fn set_debug_path(&mut self, identity_key: &str, path: PathBuf) {
        if let Some(image) = self.images.get_mut(identity_key) {
            image.debug_path = Some(path);
        }
    }

    /// Iterates images in row order.
    pub fn iter(&self) -> impl Iterator<Item = &BinaryImage> {
        self.images.values()
    }

    /// Iterates images mutably, in row order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BinaryImage> {
        self.images.values_mut()
    }

    /// Number of distinct images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
