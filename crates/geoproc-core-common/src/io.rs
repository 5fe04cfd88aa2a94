//! I/O traits for reading and writing feature streams.
//!
//! Format crates implement [`DataReader`] and [`DataWriter`] to open
//! datasets; the opened handles ([`FeatureReader`], [`FeatureWriter`]) are
//! what the pipeline's source and sink stages drive, one feature at a time.

use anyhow::Result;

use crate::types::{Crs, Feature, Meta};

/// Path that stands for standard input or standard output.
pub const STDIO_PATH: &str = "-";

/// How a dataset is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read an existing dataset.
    #[default]
    Read,
    /// Create a dataset, replacing any existing content.
    Write,
    /// Add features after any existing content.
    Append,
}

impl OpenMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::Append => "append",
        }
    }
}

/// Options for opening a dataset for reading.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// CRS to report when the dataset does not declare one.
    pub default_crs: Option<Crs>,
}

/// Options for creating a dataset for writing.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// `Write` or `Append`.
    pub mode: OpenMode,
    /// Prefix every record with an ASCII record separator (0x1E), for
    /// sequence formats.
    pub use_rs: bool,
}

/// An opened dataset that yields features lazily.
pub trait FeatureReader {
    /// Descriptor of the dataset, available as soon as it is opened.
    fn meta(&self) -> &Meta;

    /// Reads the next feature, or `None` once the dataset is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot be read or a record
    /// cannot be parsed.
    fn next_feature(&mut self) -> Result<Option<Feature>>;
}

/// An opened dataset that accepts features one at a time.
pub trait FeatureWriter {
    /// Writes one feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature cannot be encoded or written.
    fn write_feature(&mut self, feature: &Feature) -> Result<()>;

    /// Flushes and closes the dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered output cannot be flushed.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Trait for opening a format for reading.
pub trait DataReader: Send + Sync {
    /// Opens `path` (or stdin for `"-"`) and prepares the first record.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be opened or its schema cannot
    /// be inferred.
    fn open(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn FeatureReader>>;
}

/// Trait for creating a dataset in a format.
pub trait DataWriter: Send + Sync {
    /// Creates `path` (or stdout for `"-"`) for features described by `meta`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be created or the requested
    /// mode is not supported by the format.
    fn create(
        &self,
        path: &str,
        meta: &Meta,
        options: &WriteOptions,
    ) -> Result<Box<dyn FeatureWriter>>;
}
