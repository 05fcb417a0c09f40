use crate::barcode::{BarcodeRegistry, UNMATCHED_NAME};
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Running counters for one barcode (or for unassigned clusters).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetricCounts {
    pub reads: u64,
    pub pf_reads: u64,
    pub perfect_matches: u64,
    pub pf_perfect_matches: u64,
    pub one_mismatch_matches: u64,
    pub pf_one_mismatch_matches: u64,
}

/// Owned accumulator of per-barcode counters: one entry per registry barcode
/// plus the synthetic unassigned entry. Mutated per decoded cluster; parallel
/// tile workers keep private accumulators and merge them in tile order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeMetrics {
    per_barcode: Vec<MetricCounts>,
    unmatched: MetricCounts,
}

impl BarcodeMetrics {
    pub fn new(registry_len: usize) -> Self {
        Self {
            per_barcode: vec![MetricCounts::default(); registry_len],
            unmatched: MetricCounts::default(),
        }
    }

    /// Record one decoded cluster against the entry it resolved to:
    /// `Some(index)` for a matched barcode, `None` for unassigned.
    pub fn record(
        &mut self,
        entry: Option<usize>,
        mismatches: usize,
        matched: bool,
        pass_filter: bool,
    ) {
        let counts = match entry {
            Some(index) => &mut self.per_barcode[index],
            None => &mut self.unmatched,
        };
        counts.reads += 1;
        if pass_filter {
            counts.pf_reads += 1;
        }
        if matched && mismatches == 0 {
            counts.perfect_matches += 1;
            if pass_filter {
                counts.pf_perfect_matches += 1;
            }
        }
        if matched && mismatches == 1 {
            counts.one_mismatch_matches += 1;
            if pass_filter {
                counts.pf_one_mismatch_matches += 1;
            }
        }
    }

    /// Fold another accumulator into this one. Both must be sized for the
    /// same registry.
    pub fn merge(&mut self, other: &BarcodeMetrics) {
        debug_assert_eq!(self.per_barcode.len(), other.per_barcode.len());
        for (mine, theirs) in self.per_barcode.iter_mut().zip(&other.per_barcode) {
            add(mine, theirs);
        }
        add(&mut self.unmatched, &other.unmatched);
    }

    pub fn barcode(&self, index: usize) -> &MetricCounts {
        &self.per_barcode[index]
    }

    pub fn unmatched(&self) -> &MetricCounts {
        &self.unmatched
    }

    pub fn total_reads(&self) -> u64 {
        self.per_barcode.iter().map(|c| c.reads).sum::<u64>() + self.unmatched.reads
    }

    pub fn total_pf_reads(&self) -> u64 {
        self.per_barcode.iter().map(|c| c.pf_reads).sum::<u64>() + self.unmatched.pf_reads
    }
}

fn add(into: &mut MetricCounts, from: &MetricCounts) {
    into.reads += from.reads;
    into.pf_reads += from.pf_reads;
    into.perfect_matches += from.perfect_matches;
    into.pf_perfect_matches += from.pf_perfect_matches;
    into.one_mismatch_matches += from.one_mismatch_matches;
    into.pf_one_mismatch_matches += from.pf_one_mismatch_matches;
}

/// One finalized metrics row: raw counters plus the derived rates.
#[derive(Debug, Clone)]
pub struct BarcodeMetricRow {
    pub name: String,
    pub sequence: String,
    pub library: String,
    pub counts: MetricCounts,
    /// Share of all clusters that resolved to this entry.
    pub pct_matches: f64,
    /// Share of pass-filter clusters that resolved to this entry.
    pub pf_pct_matches: f64,
    /// Perfect matches as a share of this entry's reads.
    pub pct_perfect_matches: f64,
    /// PF reads relative to the mean PF reads of the named barcodes; flags
    /// under- and over-represented samples.
    pub pf_normalized_matches: f64,
}

/// Derive the final metrics table: registry order, unassigned last.
/// Read-only over the accumulated counters.
pub fn finalize(registry: &BarcodeRegistry, metrics: &BarcodeMetrics) -> Vec<BarcodeMetricRow> {
    let total_reads = metrics.total_reads();
    let total_pf = metrics.total_pf_reads();
    let named = registry.len() as f64;
    let mean_pf_reads = registry
        .barcodes()
        .iter()
        .enumerate()
        .map(|(i, _)| metrics.barcode(i).pf_reads)
        .sum::<u64>() as f64
        / named.max(1.0);

    let mut rows = Vec::with_capacity(registry.len() + 1);
    for (index, barcode) in registry.barcodes().iter().enumerate() {
        rows.push(make_row(
            barcode.name.clone(),
            barcode.sequence.clone(),
            barcode.library.clone(),
            metrics.barcode(index),
            total_reads,
            total_pf,
            mean_pf_reads,
        ));
    }
    rows.push(make_row(
        UNMATCHED_NAME.to_string(),
        String::new(),
        String::new(),
        metrics.unmatched(),
        total_reads,
        total_pf,
        mean_pf_reads,
    ));
    rows
}

fn make_row(
    name: String,
    sequence: String,
    library: String,
    counts: &MetricCounts,
    total_reads: u64,
    total_pf: u64,
    mean_pf_reads: f64,
) -> BarcodeMetricRow {
    BarcodeMetricRow {
        name,
        sequence,
        library,
        counts: counts.clone(),
        pct_matches: ratio(counts.reads, total_reads),
        pf_pct_matches: ratio(counts.pf_reads, total_pf),
        pct_perfect_matches: ratio(counts.perfect_matches, counts.reads),
        pf_normalized_matches: if mean_pf_reads > 0.0 {
            counts.pf_reads as f64 / mean_pf_reads
        } else {
            0.0
        },
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

const COLUMNS: &str = "BARCODE_NAME\tBARCODE_SEQUENCE\tLIBRARY_NAME\tREADS\tPF_READS\t\
PERFECT_MATCHES\tPF_PERFECT_MATCHES\tONE_MISMATCH_MATCHES\tPF_ONE_MISMATCH_MATCHES\t\
PCT_MATCHES\tPF_PCT_MATCHES\tPCT_PERFECT_MATCHES\tPF_NORMALIZED_MATCHES";

/// Write the finalized table as tab-delimited text.
pub fn write_metrics(path: &Path, rows: &[BarcodeMetricRow]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# bcl2bam barcode decoding metrics")?;
    writeln!(out, "{COLUMNS}")?;
    for row in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
            row.name,
            row.sequence,
            row.library,
            row.counts.reads,
            row.counts.pf_reads,
            row.counts.perfect_matches,
            row.counts.pf_perfect_matches,
            row.counts.one_mismatch_matches,
            row.counts.pf_one_mismatch_matches,
            row.pct_matches,
            row.pf_pct_matches,
            row.pct_perfect_matches,
            row.pf_normalized_matches,
        )?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeRegistry;

    #[test]
    fn finalize_normalizes_against_mean_pf_reads() {
        let registry = BarcodeRegistry::from_inline(&["AAAA", "CCCC"]).unwrap();
        let mut metrics = BarcodeMetrics::new(2);
        for _ in 0..6 {
            metrics.record(Some(0), 0, true, true);
        }
        for _ in 0..2 {
            metrics.record(Some(1), 0, true, true);
        }
        metrics.record(None, 3, false, false);

        let rows = finalize(&registry, &metrics);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].name, "0");
        assert_eq!(rows[0].counts.reads, 6);
        // mean PF reads over the named barcodes is 4
        assert!((rows[0].pf_normalized_matches - 1.5).abs() < 1e-9);
        assert!((rows[1].pf_normalized_matches - 0.5).abs() < 1e-9);
        assert!((rows[0].pct_matches - 6.0 / 9.0).abs() < 1e-9);
        assert!((rows[0].pct_perfect_matches - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merge_sums_every_counter() {
        let mut a = BarcodeMetrics::new(1);
        a.record(Some(0), 1, true, true);
        let mut b = BarcodeMetrics::new(1);
        b.record(Some(0), 0, true, false);
        b.record(None, 4, false, true);

        a.merge(&b);
        assert_eq!(a.barcode(0).reads, 2);
        assert_eq!(a.barcode(0).pf_reads, 1);
        assert_eq!(a.barcode(0).perfect_matches, 1);
        assert_eq!(a.barcode(0).one_mismatch_matches, 1);
        assert_eq!(a.unmatched().reads, 1);
        assert_eq!(a.total_reads(), 3);
    }
}
