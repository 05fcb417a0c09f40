//! Error types for lane demultiplexing.

use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` for demultiplexing operations.
pub type Result<T> = std::result::Result<T, DemuxError>;

/// Errors raised while resolving a run layout, streaming base calls, or
/// decoding barcodes.
///
/// `Config` and `Xml` are raised before any tile I/O starts; the remaining
/// variants abort the current lane. None of them are transient, so callers
/// should not retry.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// Malformed or contradictory run configuration (missing metadata,
    /// mixed-length barcode registry, invalid segment layout).
    #[error("invalid run configuration: {0}")]
    Config(String),

    /// I/O error from an underlying stream.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A file could not be opened.
    #[error("failed to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config document failed to decode.
    #[error("malformed config document: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// A base-call file disagrees with the filter file about how many
    /// clusters the tile holds.
    #[error("{}: cluster count {found} does not match filter file count {expected}", path.display())]
    ClusterCountMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// A base-call or filter file ended mid-stream.
    #[error("{}: unexpected end of file", path.display())]
    Truncated { path: PathBuf },

    /// The assembled index read does not have the registry's barcode length.
    /// This signals a layout/registry desynchronization and must not be
    /// swallowed.
    #[error("index read length {actual} does not match barcode length {expected}")]
    BarcodeLengthMismatch { expected: usize, actual: usize },

    /// A worker thread disappeared before delivering its tile.
    #[error("worker result channel closed")]
    WorkerChannel,
}
