use crate::error::{DemuxError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Name of one logical read segment within a cluster's cycle span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentName {
    /// Template read, numbered from 1 in document order.
    Read(u8),
    /// The sample index (barcode) read.
    Index,
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentName::Read(n) => write!(f, "read{n}"),
            SegmentName::Index => write!(f, "readIndex"),
        }
    }
}

/// One read segment as an inclusive 1-based cycle range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSegment {
    pub name: SegmentName,
    pub first_cycle: u32,
    pub last_cycle: u32,
}

impl ReadSegment {
    pub fn length(&self) -> usize {
        (self.last_cycle - self.first_cycle + 1) as usize
    }

    pub fn is_index(&self) -> bool {
        self.name == SegmentName::Index
    }
}

/// Software identity captured from a config document. Provenance only, it
/// never influences decoding.
#[derive(Debug, Clone)]
pub struct Software {
    pub name: String,
    pub version: String,
}

/// Resolved, immutable description of one lane: which tiles to read, how the
/// cycle span splits into logical reads, and where the data came from.
#[derive(Debug, Clone)]
pub struct RunLayout {
    /// `{instrument}_{run folder id}`, used as the read-name prefix.
    pub id: String,
    pub lane: u32,
    /// Ascending, unique.
    pub tiles: Vec<u32>,
    /// In document order: template reads first-to-last plus the optional
    /// index segment at its declared position.
    pub segments: Vec<ReadSegment>,
    pub basecall_software: Software,
    pub instrument_software: Software,
}

impl RunLayout {
    /// Highest cycle number any segment reaches; cluster arrays are sized to
    /// this span and indexed by `cycle - 1`.
    pub fn cycle_span(&self) -> usize {
        self.segments.iter().map(|s| s.last_cycle).max().unwrap_or(0) as usize
    }

    /// Cycles belonging to some segment, ascending. Cycles outside every
    /// segment are never read and never sliced.
    pub fn covered_cycles(&self) -> Vec<u32> {
        let mut cycles: Vec<u32> = self
            .segments
            .iter()
            .flat_map(|s| s.first_cycle..=s.last_cycle)
            .collect();
        cycles.sort_unstable();
        cycles
    }

    pub fn index_segment(&self) -> Option<&ReadSegment> {
        self.segments.iter().find(|s| s.is_index())
    }

    pub fn template_segments(&self) -> impl Iterator<Item = &ReadSegment> {
        self.segments.iter().filter(|s| !s.is_index())
    }
}

// ── config.xml documents ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BaseCallAnalysis {
    #[serde(rename = "Run")]
    run: BaseCallRun,
}

#[derive(Debug, Deserialize)]
struct BaseCallRun {
    #[serde(rename = "Software")]
    software: Option<SoftwareXml>,
    #[serde(rename = "TileSelection")]
    tile_selection: Option<TileSelection>,
    #[serde(rename = "RunParameters")]
    run_parameters: Option<RunParameters>,
}

#[derive(Debug, Deserialize)]
struct ImageAnalysis {
    #[serde(rename = "Run")]
    run: ImageRun,
}

#[derive(Debug, Deserialize)]
struct ImageRun {
    #[serde(rename = "Software")]
    software: Option<SoftwareXml>,
}

#[derive(Debug, Deserialize)]
struct SoftwareXml {
    #[serde(rename = "@Name")]
    name: String,
    #[serde(rename = "@Version")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct TileSelection {
    #[serde(rename = "Lane", default)]
    lanes: Vec<LaneSelection>,
}

#[derive(Debug, Deserialize)]
struct LaneSelection {
    #[serde(rename = "@Index")]
    index: u32,
    #[serde(rename = "Tile", default)]
    tiles: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct RunParameters {
    #[serde(rename = "RunFolderId")]
    run_folder_id: Option<String>,
    #[serde(rename = "Instrument")]
    instrument: Option<String>,
    #[serde(rename = "Reads", default)]
    reads: Vec<ReadXml>,
    #[serde(rename = "Barcode")]
    barcode: Option<BarcodeCycles>,
}

#[derive(Debug, Deserialize)]
struct ReadXml {
    #[serde(rename = "@Index")]
    index: u32,
    #[serde(rename = "FirstCycle")]
    first_cycle: u32,
    #[serde(rename = "LastCycle")]
    last_cycle: u32,
}

#[derive(Debug, Deserialize)]
struct BarcodeCycles {
    #[serde(rename = "Cycle", default)]
    cycles: Vec<u32>,
}

// ── resolution ───────────────────────────────────────────────────────────────

/// Resolve a lane's layout from the basecalls and intensities directories,
/// each of which must hold a `config.xml`.
pub fn resolve(intensity_dir: &Path, basecalls_dir: &Path, lane: u32) -> Result<RunLayout> {
    let basecall_xml = read_config(&basecalls_dir.join("config.xml"))?;
    let intensity_xml = read_config(&intensity_dir.join("config.xml"))?;
    from_xml(&basecall_xml, &intensity_xml, lane)
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| DemuxError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a lane's layout from config document contents.
pub fn from_xml(basecall_xml: &str, intensity_xml: &str, lane: u32) -> Result<RunLayout> {
    let basecall: BaseCallAnalysis = quick_xml::de::from_str(basecall_xml)?;
    let image: ImageAnalysis = quick_xml::de::from_str(intensity_xml)?;

    let basecall_software = basecall
        .run
        .software
        .map(|s| Software {
            name: s.name,
            version: s.version,
        })
        .ok_or_else(|| {
            DemuxError::Config("base-calling software record missing from basecalls config".into())
        })?;

    let instrument_software = image
        .run
        .software
        .map(|s| Software {
            name: s.name,
            version: s.version,
        })
        .ok_or_else(|| {
            DemuxError::Config(
                "instrument-control software record missing from intensities config".into(),
            )
        })?;

    let tiles = resolve_tiles(basecall.run.tile_selection.as_ref(), lane)?;

    let params = basecall
        .run
        .run_parameters
        .ok_or_else(|| DemuxError::Config("run parameters missing from basecalls config".into()))?;

    let instrument = params
        .instrument
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DemuxError::Config("instrument name missing from run parameters".into()))?;
    let run_folder_id = params
        .run_folder_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DemuxError::Config("run folder id missing from run parameters".into()))?;
    let id = format!("{instrument}_{run_folder_id}");

    let segments = resolve_segments(params.reads, params.barcode)?;

    Ok(RunLayout {
        id,
        lane,
        tiles,
        segments,
        basecall_software,
        instrument_software,
    })
}

fn resolve_tiles(selection: Option<&TileSelection>, lane: u32) -> Result<Vec<u32>> {
    let selection =
        selection.ok_or_else(|| DemuxError::Config("tile selection missing from config".into()))?;
    let lane_sel = selection
        .lanes
        .iter()
        .find(|l| l.index == lane)
        .ok_or_else(|| DemuxError::Config(format!("no tile selection for lane {lane}")))?;
    if lane_sel.tiles.is_empty() {
        return Err(DemuxError::Config(format!(
            "tile list for lane {lane} is empty"
        )));
    }
    let mut tiles = lane_sel.tiles.clone();
    tiles.sort_unstable();
    tiles.dedup();
    Ok(tiles)
}

fn resolve_segments(
    mut reads: Vec<ReadXml>,
    barcode: Option<BarcodeCycles>,
) -> Result<Vec<ReadSegment>> {
    if reads.is_empty() {
        return Err(DemuxError::Config("no reads defined in run parameters".into()));
    }
    reads.sort_by_key(|r| r.index);

    let barcode_cycles = barcode.map(|b| {
        let mut cycles = b.cycles;
        cycles.sort_unstable();
        cycles
    });
    let barcode_cycles = barcode_cycles.filter(|c| !c.is_empty());

    if reads.len() > 3 || (barcode_cycles.is_none() && reads.len() > 2) {
        return Err(DemuxError::Config(format!(
            "unsupported number of reads in config: {}",
            reads.len()
        )));
    }

    let mut segments = Vec::with_capacity(reads.len());
    let mut template_count: u8 = 0;
    let mut index_found = false;

    for read in &reads {
        if read.last_cycle < read.first_cycle || read.first_cycle == 0 {
            return Err(DemuxError::Config(format!(
                "invalid cycle range {}-{} for read {}",
                read.first_cycle, read.last_cycle, read.index
            )));
        }
        let length = (read.last_cycle - read.first_cycle + 1) as usize;
        let is_index = barcode_cycles
            .as_ref()
            .is_some_and(|cycles| read.first_cycle == cycles[0] && length == cycles.len());
        let name = if is_index && !index_found {
            index_found = true;
            SegmentName::Index
        } else {
            template_count += 1;
            SegmentName::Read(template_count)
        };
        segments.push(ReadSegment {
            name,
            first_cycle: read.first_cycle,
            last_cycle: read.last_cycle,
        });
    }

    if barcode_cycles.is_some() && !index_found {
        return Err(DemuxError::Config(
            "index segment not found in read list".into(),
        ));
    }

    check_overlap(&segments)?;

    Ok(segments)
}

fn check_overlap(segments: &[ReadSegment]) -> Result<()> {
    let mut ranges: Vec<(u32, u32)> = segments
        .iter()
        .map(|s| (s.first_cycle, s.last_cycle))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        if pair[1].0 <= pair[0].1 {
            return Err(DemuxError::Config(format!(
                "read segments overlap: cycles {}-{} and {}-{}",
                pair[0].0, pair[0].1, pair[1].0, pair[1].1
            )));
        }
    }
    Ok(())
}
