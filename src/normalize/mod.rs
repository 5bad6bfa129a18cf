//! Document normalization: OOXML packages into a [`DocumentTree`].
//!
//! Readers are pluggable through [`DocumentReader`]; the registry dispatches
//! by declared kind or by file extension.
//!
//! # Example
//!
//! ```no_run
//! use solvex::normalize::{normalize, ReaderRegistry};
//! use solvex::model::DocumentKind;
//!
//! fn main() -> solvex::Result<()> {
//!     let bytes = std::fs::read("cedula.docx")?;
//!     let tree = normalize(&bytes, DocumentKind::Flow)?;
//!     println!("{} sections", tree.sections.len());
//!
//!     let registry = ReaderRegistry::with_defaults();
//!     assert!(registry.supports("xlsx"));
//!     Ok(())
//! }
//! ```

mod docx;
pub(crate) mod package;
mod xlsx;

pub use docx::DocxReader;
pub use xlsx::XlsxReader;

use crate::detect::detect_kind;
use crate::error::{Error, Result};
use crate::model::{DocumentKind, DocumentTree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Error handling mode for damaged parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Fail on the first damaged part
    Strict,
    /// Record damaged sub-parts (e.g. one sheet) and keep going
    #[default]
    Lenient,
}

/// Options for normalizing documents.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Whether image payloads are loaded (anchors are always recorded)
    pub image_data: bool,
}

impl NormalizeOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on any damaged part.
    pub fn strict(mut self) -> Self {
        self.error_mode = ErrorMode::Strict;
        self
    }

    /// Keep going past damaged sub-parts.
    pub fn lenient(mut self) -> Self {
        self.error_mode = ErrorMode::Lenient;
        self
    }

    /// Enable or disable loading image payloads.
    pub fn with_image_data(mut self, load: bool) -> Self {
        self.image_data = load;
        self
    }

    /// Whether damaged sub-parts are tolerated.
    pub fn is_lenient(&self) -> bool {
        self.error_mode == ErrorMode::Lenient
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Lenient,
            image_data: true,
        }
    }
}

/// Trait for document readers.
///
/// Implement this trait to normalize another container format into the
/// shared tree.
pub trait DocumentReader: Send + Sync {
    /// Kind of tree this reader produces.
    fn kind(&self) -> DocumentKind;

    /// Supported file extensions, lowercase without the dot.
    fn supported_extensions(&self) -> &[&str];

    /// Reader name.
    fn name(&self) -> &str;

    /// Normalize raw bytes.
    fn read(&self, bytes: &[u8], options: &NormalizeOptions) -> Result<DocumentTree>;

    /// Check if this reader supports the given extension.
    fn supports_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.supported_extensions().iter().any(|e| *e == ext_lower)
    }
}

/// Registry of document readers.
pub struct ReaderRegistry {
    by_extension: HashMap<String, Arc<dyn DocumentReader>>,
    by_kind: HashMap<DocumentKind, Arc<dyn DocumentReader>>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// Create a registry with the DOCX and XLSX readers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DocxReader::new()));
        registry.register(Arc::new(XlsxReader::new()));
        registry
    }

    /// Register a reader for its kind and all its extensions.
    pub fn register(&mut self, reader: Arc<dyn DocumentReader>) {
        for ext in reader.supported_extensions() {
            self.by_extension.insert(ext.to_lowercase(), reader.clone());
        }
        self.by_kind.insert(reader.kind(), reader);
    }

    /// Reader for a file extension.
    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn DocumentReader>> {
        self.by_extension.get(&ext.to_lowercase()).cloned()
    }

    /// Reader for a document kind.
    pub fn get_by_kind(&self, kind: DocumentKind) -> Option<Arc<dyn DocumentReader>> {
        self.by_kind.get(&kind).cloned()
    }

    /// Check if an extension is supported.
    pub fn supports(&self, ext: &str) -> bool {
        self.by_extension.contains_key(&ext.to_lowercase())
    }

    /// Normalize bytes of a declared kind, or of the sniffed kind when
    /// `declared` is `None`.
    pub fn normalize(
        &self,
        bytes: &[u8],
        declared: Option<DocumentKind>,
        options: &NormalizeOptions,
    ) -> Result<DocumentTree> {
        let kind = match declared {
            Some(kind) => kind,
            None => detect_kind(bytes)?,
        };
        let reader = self
            .get_by_kind(kind)
            .ok_or_else(|| Error::UnsupportedFormat(format!("no reader for {}", kind)))?;
        log::debug!("Normalizing {} bytes with {} reader", bytes.len(), reader.name());
        reader.read(bytes, options)
    }

    /// Read and normalize a file, choosing the reader by extension and
    /// falling back to content sniffing.
    pub fn normalize_file(&self, path: &Path, options: &NormalizeOptions) -> Result<DocumentTree> {
        let bytes = std::fs::read(path)?;
        let declared = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.get_by_extension(ext))
            .map(|reader| reader.kind());
        self.normalize(&bytes, declared, options)
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Normalize raw bytes with the default readers and options.
pub fn normalize(bytes: &[u8], declared_kind: DocumentKind) -> Result<DocumentTree> {
    ReaderRegistry::with_defaults().normalize(bytes, Some(declared_kind), &NormalizeOptions::default())
}

/// Normalize raw bytes with custom options.
pub fn normalize_with_options(
    bytes: &[u8],
    declared_kind: Option<DocumentKind>,
    options: &NormalizeOptions,
) -> Result<DocumentTree> {
    ReaderRegistry::with_defaults().normalize(bytes, declared_kind, options)
}
