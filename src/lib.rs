//! bcl2bam: convert Illumina per-cycle base calls into unaligned BAM records,
//! assigning each cluster to a sample by its index (barcode) read.
//!
//! # Library usage
//!
//! ```no_run
//! use bcl2bam::barcode::{BarcodeDecoder, BarcodeRegistry, DecoderConfig};
//! use bcl2bam::pipeline::{self, LaneOptions};
//! use bcl2bam::sink::MemorySink;
//! use std::path::Path;
//!
//! # fn main() -> bcl2bam::Result<()> {
//! let intensities = Path::new("run/Data/Intensities");
//! let basecalls = intensities.join("BaseCalls");
//!
//! let layout = bcl2bam::layout::resolve(intensities, &basecalls, 1)?;
//! let registry = BarcodeRegistry::from_inline(&["ACAACGCA", "TGTGAAGC", "CCTTAGTG"])?;
//! let decoder = BarcodeDecoder::new(registry, DecoderConfig::default());
//!
//! let tiles = layout.tiles.clone();
//! let mut sink = MemorySink::default();
//! let (stats, metrics) = pipeline::run(
//!     &basecalls,
//!     &layout,
//!     &tiles,
//!     Some(&decoder),
//!     &LaneOptions::default(),
//!     &mut sink,
//! )?;
//! # let _ = (stats, metrics);
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod barcode;
pub mod cli;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod tile;

pub(crate) mod types;

// Flat re-exports for the most commonly used types.
pub use assemble::AssembledRead;
pub use barcode::{BarcodeDecoder, BarcodeMatch, BarcodeRegistry, DecoderConfig, NamedBarcode};
pub use error::{DemuxError, Result};
pub use layout::{ReadSegment, RunLayout, SegmentName};
pub use metrics::{BarcodeMetricRow, BarcodeMetrics};
pub use pipeline::{LaneOptions, Stats};
pub use sink::{BamSink, MemorySink, RecordSink};
pub use tile::{Cluster, TileReader};
