use anyhow::Result;
use bcl2bam::barcode::{BarcodeDecoder, BarcodeRegistry, DecoderConfig};
use bcl2bam::cli::Args;
use bcl2bam::sink::{self, BamSink, ReadGroupConfig, RecordSink};
use bcl2bam::{layout, metrics, pipeline};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let layout = layout::resolve(&args.intensity_dir, &args.basecalls_dir, args.lane)?;
    tracing::info!(
        run = %layout.id,
        lane = layout.lane,
        tiles = layout.tiles.len(),
        reads = layout.segments.len(),
        "resolved run layout"
    );

    let registry = if let Some(path) = &args.barcode_file {
        Some(BarcodeRegistry::from_file(path)?)
    } else if !args.barcodes.is_empty() {
        Some(BarcodeRegistry::from_inline(&args.barcodes)?)
    } else {
        None
    };
    let decoder = registry.clone().map(|registry| {
        BarcodeDecoder::new(
            registry,
            DecoderConfig {
                max_mismatches: args.max_mismatches,
                min_mismatch_delta: args.min_mismatch_delta,
                max_no_calls: args.max_no_calls,
                convert_low_quality_to_no_call: args.convert_low_quality,
                low_quality_threshold: args.quality_threshold,
            },
        )
    });
    if args.metrics.is_some() && decoder.is_none() {
        tracing::warn!("--metrics given without barcodes; no metrics will be written");
    }

    let tiles = pipeline::select_tiles(&layout.tiles, args.first_tile, args.tile_limit);

    let header = sink::build_header(
        &layout,
        registry.as_ref(),
        &ReadGroupConfig {
            id: args.read_group_id.clone(),
            sample: args.sample.clone(),
            library: args.library.clone(),
            study: args.study.clone(),
            platform_unit: args.platform_unit.clone(),
            platform: args.platform.clone(),
        },
    )?;
    let mut sink = BamSink::create(
        &args.out_bam,
        header,
        sink::parse_tag(&args.barcode_tag)?,
        sink::parse_tag(&args.quality_tag)?,
    )?;

    let opts = pipeline::LaneOptions {
        pf_filter: args.pf_filter,
        threads: args.threads as usize,
        read_group_id: args.read_group_id.clone(),
    };
    let (stats, rows) = pipeline::run(
        &args.basecalls_dir,
        &layout,
        &tiles,
        decoder.as_ref(),
        &opts,
        &mut sink,
    )?;
    sink.finish()?;

    if let (Some(path), Some(rows)) = (&args.metrics, &rows) {
        metrics::write_metrics(path, rows)?;
    }

    tracing::info!(
        tiles = stats.tiles,
        clusters = stats.clusters,
        pf_clusters = stats.pf_clusters,
        records = stats.records_written,
        "bcl2bam: lane processing complete"
    );
    Ok(())
}
