use crate::error::{DemuxError, Result};
use crate::metrics::BarcodeMetrics;
use crate::types::{HashSet, HashSetExt};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Name given to unassigned clusters in metrics and read groups.
pub const UNMATCHED_NAME: &str = "0";

const ALPHABET: &[u8] = b"ACGTN";

/// One registered sample barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBarcode {
    /// Uppercase, fixed length across the registry.
    pub sequence: String,
    pub name: String,
    pub library: String,
}

/// The set of barcodes a lane demultiplexes against. Loaded once, read-only
/// thereafter; all sequences share one length.
#[derive(Debug, Clone)]
pub struct BarcodeRegistry {
    barcodes: Vec<NamedBarcode>,
    length: usize,
}

impl BarcodeRegistry {
    /// Build a registry from bare sequences, auto-named by position.
    pub fn from_inline<S: AsRef<str>>(sequences: &[S]) -> Result<Self> {
        let specs = sequences
            .iter()
            .map(|s| (s.as_ref().to_string(), None, None))
            .collect();
        Self::build(specs)
    }

    /// Load a registry from a tab-delimited file with a header line naming a
    /// `barcode_sequence` column and optional `barcode_name` and
    /// `library_name` columns.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| DemuxError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| DemuxError::Config(format!("{}: barcode file is empty", path.display())))?;
        let columns: Vec<&str> = header.trim_end().split('\t').collect();
        let sequence_col = columns
            .iter()
            .position(|c| *c == "barcode_sequence")
            .ok_or_else(|| {
                DemuxError::Config(format!(
                    "{}: barcode file header lacks a barcode_sequence column",
                    path.display()
                ))
            })?;
        let name_col = columns.iter().position(|c| *c == "barcode_name");
        let library_col = columns.iter().position(|c| *c == "library_name");

        let mut specs = Vec::new();
        for line in lines {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let sequence = fields.get(sequence_col).copied().unwrap_or("").to_string();
            if sequence.is_empty() {
                return Err(DemuxError::Config(format!(
                    "{}: barcode row lacks a sequence",
                    path.display()
                )));
            }
            let field = |col: Option<usize>| {
                col.and_then(|c| fields.get(c))
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty())
            };
            specs.push((sequence, field(name_col), field(library_col)));
        }
        Self::build(specs)
    }

    fn build(specs: Vec<(String, Option<String>, Option<String>)>) -> Result<Self> {
        if specs.is_empty() {
            return Err(DemuxError::Config("barcode registry is empty".into()));
        }

        let mut barcodes = Vec::with_capacity(specs.len());
        let mut seen = HashSet::with_capacity(specs.len());
        let mut length = None;

        for (position, (sequence, name, library)) in specs.into_iter().enumerate() {
            let sequence = sequence.to_ascii_uppercase();
            if let Some(bad) = sequence.bytes().find(|b| !ALPHABET.contains(b)) {
                return Err(DemuxError::Config(format!(
                    "barcode {sequence} contains invalid base '{}'",
                    bad as char
                )));
            }
            match length {
                None => length = Some(sequence.len()),
                Some(len) if len != sequence.len() => {
                    return Err(DemuxError::Config(format!(
                        "barcodes must all be the same length: {sequence} has length {}, expected {len}",
                        sequence.len()
                    )));
                }
                Some(_) => {}
            }
            if !seen.insert(sequence.clone()) {
                return Err(DemuxError::Config(format!("duplicate barcode {sequence}")));
            }
            let positional = (position + 1).to_string();
            barcodes.push(NamedBarcode {
                sequence,
                name: name.unwrap_or_else(|| positional.clone()),
                library: library.unwrap_or(positional),
            });
        }

        Ok(Self {
            barcodes,
            // specs was non-empty, so length is set.
            length: length.unwrap_or(0),
        })
    }

    pub fn barcodes(&self) -> &[NamedBarcode] {
        &self.barcodes
    }

    pub fn barcode_length(&self) -> usize {
        self.length
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }
}

/// Decoding thresholds. Defaults follow the conventional single-mismatch
/// model: one mismatch tolerated, one mismatch of separation required, two
/// no-calls allowed.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub max_mismatches: usize,
    pub min_mismatch_delta: usize,
    pub max_no_calls: usize,
    /// Mask index bases at or below `low_quality_threshold` to `N` before
    /// matching.
    pub convert_low_quality_to_no_call: bool,
    pub low_quality_threshold: u8,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_mismatches: 1,
            min_mismatch_delta: 1,
            max_no_calls: 2,
            convert_low_quality_to_no_call: false,
            low_quality_threshold: 15,
        }
    }
}

/// Verdict for one index read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeMatch {
    /// Matched barcode sequence, empty when unmatched.
    pub barcode: String,
    /// Matched barcode name, `"0"` when unmatched.
    pub name: String,
    /// Distance to the best candidate, whether or not it matched.
    pub mismatches: usize,
    pub no_calls: usize,
    pub matched: bool,
}

/// Matches index reads against the registry. The registry and config are
/// read-only; per-barcode counters live in an explicit [`BarcodeMetrics`]
/// accumulator so parallel callers can keep private ones and merge.
#[derive(Debug, Clone)]
pub struct BarcodeDecoder {
    registry: BarcodeRegistry,
    config: DecoderConfig,
}

impl BarcodeDecoder {
    pub fn new(registry: BarcodeRegistry, config: DecoderConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &BarcodeRegistry {
        &self.registry
    }

    /// Fresh accumulator sized for this registry.
    pub fn new_metrics(&self) -> BarcodeMetrics {
        BarcodeMetrics::new(self.registry.len())
    }

    /// Decode one index read and record the outcome in `metrics`.
    ///
    /// A length mismatch against the registry means the layout and registry
    /// have desynchronized; it aborts the lane rather than being scored.
    pub fn decode(
        &self,
        bases: &[u8],
        quals: &[u8],
        pass_filter: bool,
        metrics: &mut BarcodeMetrics,
    ) -> Result<BarcodeMatch> {
        let expected = self.registry.length;
        if bases.len() != expected {
            return Err(DemuxError::BarcodeLengthMismatch {
                expected,
                actual: bases.len(),
            });
        }

        let read: Cow<'_, [u8]> = if self.config.convert_low_quality_to_no_call {
            debug_assert_eq!(bases.len(), quals.len());
            Cow::Owned(mask_low_quality(
                bases,
                quals,
                self.config.low_quality_threshold,
            ))
        } else {
            Cow::Borrowed(bases)
        };

        let no_calls = read.iter().filter(|&&b| b == b'N').count();

        let mut best = usize::MAX;
        let mut best_index = 0;
        let mut second_best = usize::MAX;
        for (index, candidate) in self.registry.barcodes.iter().enumerate() {
            let d = distance(candidate.sequence.as_bytes(), &read);
            if d < best {
                second_best = best;
                best = d;
                best_index = index;
            } else if d < second_best {
                second_best = d;
            }
        }

        let matched = best <= self.config.max_mismatches
            && no_calls <= self.config.max_no_calls
            && second_best.saturating_sub(best) >= self.config.min_mismatch_delta;

        metrics.record(matched.then_some(best_index), best, matched, pass_filter);

        let verdict = if matched {
            let winner = &self.registry.barcodes[best_index];
            BarcodeMatch {
                barcode: winner.sequence.clone(),
                name: winner.name.clone(),
                mismatches: best,
                no_calls,
                matched: true,
            }
        } else {
            BarcodeMatch {
                barcode: String::new(),
                name: UNMATCHED_NAME.to_string(),
                mismatches: best,
                no_calls,
                matched: false,
            }
        };
        Ok(verdict)
    }
}

/// Replace every base whose quality is at or below `threshold` with `N`,
/// regardless of the original call. Qualities are Phred scale, linear,
/// zero-based.
pub fn mask_low_quality(bases: &[u8], quals: &[u8], threshold: u8) -> Vec<u8> {
    bases
        .iter()
        .zip(quals)
        .map(|(&base, &qual)| if qual <= threshold { b'N' } else { base })
        .collect()
}

/// Hamming distance where `N` on either side is a guaranteed mismatch.
fn distance(barcode: &[u8], read: &[u8]) -> usize {
    barcode
        .iter()
        .zip(read)
        .filter(|&(&b, &r)| b == b'N' || r == b'N' || b != r)
        .count()
}
