use crate::assemble::{assemble_reads, AssembledRead};
use crate::barcode::BarcodeDecoder;
use crate::error::{DemuxError, Result};
use crate::layout::{RunLayout, SegmentName};
use crate::metrics::{self, BarcodeMetricRow, BarcodeMetrics};
use crate::sink::{Pairing, RecordContext, RecordSink};
use crate::tile::{Cluster, TileReader};
use crossfire::mpmc;
use std::collections::BTreeMap;
use std::path::Path;
use std::thread;

/// Lane-level knobs the demultiplexer itself consumes.
#[derive(Debug, Clone)]
pub struct LaneOptions {
    /// Skip clusters failing the instrument filter at emission time; they
    /// are still decoded and counted.
    pub pf_filter: bool,
    pub threads: usize,
    /// Read-group id used when no barcode registry is configured.
    pub read_group_id: String,
}

impl Default for LaneOptions {
    fn default() -> Self {
        Self {
            pf_filter: true,
            threads: 1,
            read_group_id: "1".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub tiles: u64,
    pub clusters: u64,
    pub pf_clusters: u64,
    pub records_written: u64,
}

/// Restrict the tile list to a window, for debugging runs. Tiles below
/// `first` are dropped, then at most `limit` tiles are kept.
pub fn select_tiles(tiles: &[u32], first: Option<u32>, limit: Option<usize>) -> Vec<u32> {
    let selected = tiles
        .iter()
        .copied()
        .filter(|&t| first.is_none_or(|f| t >= f));
    match limit {
        Some(limit) => selected.take(limit).collect(),
        None => selected.collect(),
    }
}

/// A read ready for the sink, with its tags resolved. Owned so tile workers
/// can hand whole tiles back to the coordinator.
#[derive(Debug)]
struct PendingRecord {
    read: AssembledRead,
    name: String,
    read_group: String,
    pairing: Pairing,
    fail_filter: bool,
    index: Option<(Vec<u8>, Vec<u8>)>,
}

/// Demultiplex one lane: every tile in ascending order, every cluster in
/// file order, each assembled, decoded, and handed to the sink. Returns run
/// statistics plus the finalized metrics table when decoding was configured.
pub fn run<S: RecordSink>(
    basecalls_dir: &Path,
    layout: &RunLayout,
    tiles: &[u32],
    decoder: Option<&BarcodeDecoder>,
    opts: &LaneOptions,
    sink: &mut S,
) -> Result<(Stats, Option<Vec<BarcodeMetricRow>>)> {
    if let Some(decoder) = decoder {
        let index_segment = layout.index_segment().ok_or_else(|| {
            DemuxError::Config("barcodes supplied but the run layout has no index read".into())
        })?;
        if index_segment.length() != decoder.registry().barcode_length() {
            return Err(DemuxError::Config(format!(
                "index read spans {} cycles but barcodes are {} bases long",
                index_segment.length(),
                decoder.registry().barcode_length()
            )));
        }
    }

    let mut stats = Stats::default();
    let mut lane_metrics = decoder.map(|d| d.new_metrics());

    if opts.threads > 1 {
        run_threaded(
            basecalls_dir,
            layout,
            tiles,
            decoder,
            opts,
            sink,
            &mut stats,
            &mut lane_metrics,
        )?;
    } else {
        for &tile in tiles {
            tracing::debug!(tile, "processing tile");
            stats.tiles += 1;
            let reader = TileReader::open(basecalls_dir, layout, tile)?;
            for (cluster_index, cluster) in reader.enumerate() {
                let cluster = cluster?;
                stats.clusters += 1;
                if cluster.pass_filter {
                    stats.pf_clusters += 1;
                }
                let records = demux_cluster(
                    layout,
                    decoder,
                    opts,
                    tile,
                    cluster_index,
                    &cluster,
                    &mut lane_metrics,
                )?;
                for record in &records {
                    append(sink, record)?;
                    stats.records_written += 1;
                }
            }
        }
    }

    let rows = match (decoder, &lane_metrics) {
        (Some(decoder), Some(acc)) => Some(metrics::finalize(decoder.registry(), acc)),
        _ => None,
    };
    Ok((stats, rows))
}

struct WorkItem {
    idx: usize,
    tile: u32,
}

struct TileOutput {
    records: Vec<PendingRecord>,
    metrics: Option<BarcodeMetrics>,
    clusters: u64,
    pf_clusters: u64,
}

struct ResultItem {
    idx: usize,
    result: Result<TileOutput>,
}

#[allow(clippy::too_many_arguments)]
fn run_threaded<S: RecordSink>(
    basecalls_dir: &Path,
    layout: &RunLayout,
    tiles: &[u32],
    decoder: Option<&BarcodeDecoder>,
    opts: &LaneOptions,
    sink: &mut S,
    stats: &mut Stats,
    lane_metrics: &mut Option<BarcodeMetrics>,
) -> Result<()> {
    crossfire::detect_backoff_cfg();
    let worker_count = opts.threads;
    let cap = worker_count.saturating_mul(2).max(4);
    let (tx_work, rx_work) = mpmc::bounded_blocking::<WorkItem>(cap);
    let (tx_res, rx_res) = mpmc::unbounded_blocking::<ResultItem>();

    thread::scope(|scope| -> Result<()> {
        for _ in 0..worker_count {
            let rx_work = rx_work.clone();
            let tx_res = tx_res.clone();
            scope.spawn(move || {
                while let Ok(item) = rx_work.recv() {
                    let result = process_tile(basecalls_dir, layout, decoder, opts, item.tile);
                    let _ = tx_res.send(ResultItem {
                        idx: item.idx,
                        result,
                    });
                }
            });
        }
        drop(tx_res);

        let mut total = 0usize;
        for (idx, &tile) in tiles.iter().enumerate() {
            tx_work
                .send(WorkItem { idx, tile })
                .map_err(|_| DemuxError::WorkerChannel)?;
            total += 1;
        }
        drop(tx_work);

        // Emission must stay tile-ascending even though workers finish out
        // of order, so results park here until their turn comes up.
        let mut pending: BTreeMap<usize, Result<TileOutput>> = BTreeMap::new();
        let mut next_idx = 0usize;
        let mut drained = 0usize;
        while drained < total {
            let item = rx_res.recv().map_err(|_| DemuxError::WorkerChannel)?;
            pending.insert(item.idx, item.result);
            while let Some(result) = pending.remove(&next_idx) {
                let output = result?;
                stats.tiles += 1;
                stats.clusters += output.clusters;
                stats.pf_clusters += output.pf_clusters;
                for record in &output.records {
                    append(sink, record)?;
                    stats.records_written += 1;
                }
                if let (Some(acc), Some(tile_metrics)) = (lane_metrics.as_mut(), &output.metrics) {
                    acc.merge(tile_metrics);
                }
                next_idx += 1;
                drained += 1;
            }
        }

        Ok(())
    })
}

fn process_tile(
    basecalls_dir: &Path,
    layout: &RunLayout,
    decoder: Option<&BarcodeDecoder>,
    opts: &LaneOptions,
    tile: u32,
) -> Result<TileOutput> {
    tracing::debug!(tile, "processing tile");
    let mut tile_metrics = decoder.map(|d| d.new_metrics());
    let reader = TileReader::open(basecalls_dir, layout, tile)?;
    let mut records = Vec::new();
    let mut clusters = 0u64;
    let mut pf_clusters = 0u64;
    for (cluster_index, cluster) in reader.enumerate() {
        let cluster = cluster?;
        clusters += 1;
        if cluster.pass_filter {
            pf_clusters += 1;
        }
        records.extend(demux_cluster(
            layout,
            decoder,
            opts,
            tile,
            cluster_index,
            &cluster,
            &mut tile_metrics,
        )?);
    }
    Ok(TileOutput {
        records,
        metrics: tile_metrics,
        clusters,
        pf_clusters,
    })
}

/// Assemble and decode one cluster, producing its sink-ready records.
/// Decoding and metrics always see the cluster; the pass filter only gates
/// emission.
fn demux_cluster(
    layout: &RunLayout,
    decoder: Option<&BarcodeDecoder>,
    opts: &LaneOptions,
    tile: u32,
    cluster_index: usize,
    cluster: &Cluster,
    metrics: &mut Option<BarcodeMetrics>,
) -> Result<Vec<PendingRecord>> {
    let mut reads = assemble_reads(cluster, layout);
    let index_pos = reads.iter().position(|r| r.name == SegmentName::Index);
    let index_read = index_pos.map(|pos| reads.remove(pos));

    let verdict = match (decoder, &index_read) {
        (Some(decoder), Some(index)) => {
            let acc = metrics
                .as_mut()
                .expect("metrics accumulator exists whenever a decoder does");
            Some(decoder.decode(&index.bases, &index.quals, cluster.pass_filter, acc)?)
        }
        _ => None,
    };

    if opts.pf_filter && !cluster.pass_filter {
        return Ok(Vec::new());
    }

    let mut name = format!("{}:{}:{}:{}", layout.id, layout.lane, tile, cluster_index);
    let read_group = match &verdict {
        Some(v) => {
            name.push('#');
            name.push_str(&v.name);
            v.name.clone()
        }
        None => opts.read_group_id.clone(),
    };

    let template_count = reads.len();
    let records = reads
        .into_iter()
        .enumerate()
        .map(|(i, read)| PendingRecord {
            read,
            name: name.clone(),
            read_group: read_group.clone(),
            pairing: if template_count < 2 {
                Pairing::Single
            } else if i == 0 {
                Pairing::First
            } else {
                Pairing::Last
            },
            fail_filter: !cluster.pass_filter,
            index: index_read
                .as_ref()
                .map(|index| (index.bases.clone(), index.quals.clone())),
        })
        .collect();
    Ok(records)
}

fn append<S: RecordSink>(sink: &mut S, record: &PendingRecord) -> Result<()> {
    let ctx = RecordContext {
        name: &record.name,
        read_group: &record.read_group,
        pairing: record.pairing,
        fail_filter: record.fail_filter,
        index: record
            .index
            .as_ref()
            .map(|(bases, quals)| (bases.as_slice(), quals.as_slice())),
    };
    sink.append(&record.read, &ctx)
}
