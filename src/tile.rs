use crate::error::{DemuxError, Result};
use crate::layout::RunLayout;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// One cluster's read-out across the tile's full cycle span.
///
/// `bases` and `quals` are indexed by `cycle - 1`. Slots outside every read
/// segment stay `(b'N', 0)`; they are never sliced into an assembled read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub bases: Vec<u8>,
    /// Phred scale, linear, zero-based.
    pub quals: Vec<u8>,
    pub pass_filter: bool,
}

struct CycleStream {
    cycle: u32,
    path: PathBuf,
    reader: BufReader<File>,
}

/// Streams one tile's clusters out of its per-cycle base-call files.
///
/// All file handles are owned by the reader and dropped with it, so at most
/// one tile's streams are live when tiles are processed sequentially.
/// Clusters come out in file position order; that order is their identity.
pub struct TileReader {
    streams: Vec<CycleStream>,
    filter: Vec<bool>,
    span: usize,
    cluster_count: u32,
    next: u32,
    failed: bool,
}

impl TileReader {
    /// Open the filter file and one base-call stream per covered cycle,
    /// verifying that every stream agrees on the tile's cluster count.
    pub fn open(basecalls_dir: &Path, layout: &RunLayout, tile: u32) -> Result<Self> {
        let lane_dir = basecalls_dir.join(format!("L{:03}", layout.lane));
        let filter_path = lane_dir.join(format!("s_{}_{}.filter", layout.lane, tile));
        let filter = read_filter_file(&filter_path)?;
        let cluster_count = filter.len() as u32;

        let mut streams = Vec::new();
        for cycle in layout.covered_cycles() {
            let path = lane_dir
                .join(format!("C{cycle}.1"))
                .join(format!("s_{}_{}.bcl", layout.lane, tile));
            let file = File::open(&path).map_err(|source| DemuxError::Open {
                path: path.clone(),
                source,
            })?;
            let mut reader = BufReader::new(file);
            let declared = read_u32(&mut reader, &path)?;
            if declared != cluster_count {
                return Err(DemuxError::ClusterCountMismatch {
                    path,
                    expected: cluster_count,
                    found: declared,
                });
            }
            streams.push(CycleStream {
                cycle,
                path,
                reader,
            });
        }

        Ok(Self {
            streams,
            filter,
            span: layout.cycle_span(),
            cluster_count,
            next: 0,
            failed: false,
        })
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    fn read_cluster(&mut self) -> Result<Cluster> {
        let mut bases = vec![b'N'; self.span];
        let mut quals = vec![0u8; self.span];
        let mut byte = [0u8; 1];
        for stream in &mut self.streams {
            stream
                .reader
                .read_exact(&mut byte)
                .map_err(|_| DemuxError::Truncated {
                    path: stream.path.clone(),
                })?;
            let call = byte[0];
            // A zero byte is an uncalled position.
            if call != 0 {
                let slot = (stream.cycle - 1) as usize;
                bases[slot] = BASES[(call & 0b11) as usize];
                quals[slot] = call >> 2;
            }
        }
        Ok(Cluster {
            bases,
            quals,
            pass_filter: self.filter[self.next as usize],
        })
    }
}

impl Iterator for TileReader {
    type Item = Result<Cluster>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.cluster_count {
            return None;
        }
        match self.read_cluster() {
            Ok(cluster) => {
                self.next += 1;
                Some(Ok(cluster))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn read_u32(reader: &mut BufReader<File>, path: &Path) -> Result<u32> {
    let mut word = [0u8; 4];
    reader
        .read_exact(&mut word)
        .map_err(|_| DemuxError::Truncated {
            path: path.to_path_buf(),
        })?;
    Ok(u32::from_le_bytes(word))
}

/// Load the pass-filter flags for a tile.
///
/// Versioned filter files start with a zero word followed by the format
/// version and the cluster count; the unversioned layout opens directly with
/// the cluster count. One byte per cluster follows, bit 0 set = pass.
fn read_filter_file(path: &Path) -> Result<Vec<bool>> {
    let file = File::open(path).map_err(|source| DemuxError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let first = read_u32(&mut reader, path)?;
    let count = if first == 0 {
        let _version = read_u32(&mut reader, path)?;
        read_u32(&mut reader, path)?
    } else {
        first
    };

    let mut flags = vec![0u8; count as usize];
    reader
        .read_exact(&mut flags)
        .map_err(|_| DemuxError::Truncated {
            path: path.to_path_buf(),
        })?;
    Ok(flags.into_iter().map(|b| b & 1 == 1).collect())
}
