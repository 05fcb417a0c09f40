use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bcl2bam",
    about = "Convert Illumina per-cycle base calls to unaligned BAM, demultiplexing clusters by sample barcode",
    version
)]
pub struct Args {
    /// Illumina intensities directory holding config.xml
    #[arg(short = 'i', long = "intensity-dir", value_name = "DIR")]
    pub intensity_dir: PathBuf,

    /// Illumina basecalls directory holding config.xml plus the per-lane
    /// filter and bcl files
    #[arg(short = 'b', long = "basecalls-dir", value_name = "DIR")]
    pub basecalls_dir: PathBuf,

    /// Lane number
    #[arg(short = 'l', long)]
    pub lane: u32,

    /// Output BAM path
    #[arg(short = 'o', long = "out", value_name = "BAM")]
    pub out_bam: PathBuf,

    /// Barcode sequence, repeatable; mutually exclusive with --barcode-file
    #[arg(long = "barcode", value_name = "SEQ", conflicts_with = "barcode_file")]
    pub barcodes: Vec<String>,

    /// Tab-delimited barcode file with a barcode_sequence column and
    /// optional barcode_name / library_name columns
    #[arg(long = "barcode-file", value_name = "TSV")]
    pub barcode_file: Option<PathBuf>,

    /// Write per-barcode decoding metrics to this file
    #[arg(short = 'm', long = "metrics", value_name = "FILE")]
    pub metrics: Option<PathBuf>,

    /// Maximum mismatches for a barcode to be considered a match
    #[arg(long, default_value_t = 1)]
    pub max_mismatches: usize,

    /// Minimum difference between the best and second-best mismatch counts
    /// for a barcode to be considered a match
    #[arg(long, default_value_t = 1)]
    pub min_mismatch_delta: usize,

    /// Maximum no-calls in an index read before it is unmatchable
    #[arg(long, default_value_t = 2)]
    pub max_no_calls: usize,

    /// Mask index bases at or below --quality-threshold to N before matching
    #[arg(long = "convert-low-quality")]
    pub convert_low_quality: bool,

    /// Phred quality at or below which --convert-low-quality masks a base
    #[arg(long = "quality-threshold", default_value_t = 15)]
    pub quality_threshold: u8,

    /// Tag holding the index read bases on output records
    #[arg(long = "barcode-tag", value_name = "TAG", default_value = "RT")]
    pub barcode_tag: String,

    /// Tag holding the index read qualities on output records
    #[arg(long = "quality-tag", value_name = "TAG", default_value = "QT")]
    pub quality_tag: String,

    /// Drop clusters that fail the instrument filter (pass --pf-filter false
    /// to keep them, flagged as QC failures)
    #[arg(long = "pf-filter", default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    pub pf_filter: bool,

    /// First tile to process (for debugging)
    #[arg(long = "first-tile", value_name = "TILE")]
    pub first_tile: Option<u32>,

    /// Process at most this many tiles (for debugging)
    #[arg(long = "tile-limit", value_name = "N")]
    pub tile_limit: Option<usize>,

    /// Number of threads (CPUs) to use
    #[arg(short = 'p', long = "threads", default_value_t = 1)]
    pub threads: u8,

    /// Set logging level to WARN
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Read-group id used when no barcodes are supplied
    #[arg(long = "read-group-id", default_value = "1")]
    pub read_group_id: String,

    /// The name of the sequenced sample
    #[arg(long)]
    pub sample: Option<String>,

    /// The name of the sequenced library, when the barcode file does not
    /// name one
    #[arg(long)]
    pub library: Option<String>,

    /// The name of the study
    #[arg(long)]
    pub study: Option<String>,

    /// Platform unit; defaults to {instrument}_{run}_{lane}
    #[arg(long = "platform-unit")]
    pub platform_unit: Option<String>,

    /// Sequencing technology that produced the reads
    #[arg(long, default_value = "ILLUMINA")]
    pub platform: String,
}
