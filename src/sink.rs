use crate::assemble::AssembledRead;
use crate::barcode::{BarcodeRegistry, UNMATCHED_NAME};
use crate::error::{DemuxError, Result};
use crate::layout::RunLayout;
use noodles::{bam, bgzf, sam};
use sam::alignment::io::Write as _;
use sam::alignment::record::data::field::Tag;
use sam::alignment::record::Flags;
use sam::alignment::record_buf::{data::field::Value, QualityScores, Sequence};
use sam::alignment::RecordBuf;
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

/// Where an emitted read sits within its cluster's template reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    Single,
    First,
    Last,
}

/// Everything the sink needs to tag one read besides its bases.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    /// Read name, already carrying the `#<barcode name>` sample tag when the
    /// lane is demultiplexed.
    pub name: &'a str,
    pub read_group: &'a str,
    pub pairing: Pairing,
    /// Cluster failed the instrument's pass filter.
    pub fail_filter: bool,
    /// Index read payload `(bases, zero-based phred quals)` to carry as tags.
    pub index: Option<(&'a [u8], &'a [u8])>,
}

/// Append-only destination for assembled, tagged reads. Flush/rollback
/// behavior belongs to the implementation, not the demultiplexer.
pub trait RecordSink {
    fn append(&mut self, read: &AssembledRead, ctx: &RecordContext<'_>) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Validate a two-character SAM tag name from configuration.
pub fn parse_tag(name: &str) -> Result<Tag> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DemuxError::Config(format!(
            "invalid tag name {name:?}: expected two alphanumeric characters"
        )));
    }
    Ok(Tag::new(bytes[0], bytes[1]))
}

/// Read-group fields supplied by the host CLI.
#[derive(Debug, Clone, Default)]
pub struct ReadGroupConfig {
    /// Read-group id used when the lane is not demultiplexed.
    pub id: String,
    pub sample: Option<String>,
    pub library: Option<String>,
    pub study: Option<String>,
    pub platform_unit: Option<String>,
    pub platform: String,
}

/// Build the output header: provenance program chain (instrument control →
/// base calling → this tool) and one read group per barcode, or the single
/// configured read group when no registry is in play.
pub fn build_header(
    layout: &RunLayout,
    registry: Option<&BarcodeRegistry>,
    rg: &ReadGroupConfig,
) -> Result<sam::Header> {
    let mut text = String::new();
    text.push_str("@HD\tVN:1.6\tSO:unsorted\n");
    let _ = writeln!(
        text,
        "@PG\tID:SCS\tPN:{}\tVN:{}\tDS:Controlling software on instrument",
        layout.instrument_software.name, layout.instrument_software.version
    );
    let _ = writeln!(
        text,
        "@PG\tID:basecalling\tPN:{}\tVN:{}\tPP:SCS\tDS:Basecalling Package",
        layout.basecall_software.name, layout.basecall_software.version
    );
    let _ = writeln!(
        text,
        "@PG\tID:bcl2bam\tPN:bcl2bam\tVN:{}\tPP:basecalling\tDS:Convert Illumina BCL to BAM",
        env!("CARGO_PKG_VERSION")
    );

    let unit = rg
        .platform_unit
        .clone()
        .unwrap_or_else(|| format!("{}_{}", layout.id, layout.lane));
    match registry {
        Some(registry) => {
            for barcode in registry.barcodes() {
                write_read_group(
                    &mut text,
                    &barcode.name,
                    rg,
                    Some(&barcode.library),
                    &format!("{unit}#{}", barcode.name),
                );
            }
            write_read_group(
                &mut text,
                UNMATCHED_NAME,
                rg,
                None,
                &format!("{unit}#{UNMATCHED_NAME}"),
            );
        }
        None => write_read_group(&mut text, &rg.id, rg, None, &unit),
    }

    text.parse()
        .map_err(|e| DemuxError::Config(format!("invalid output header: {e}")))
}

fn write_read_group(
    text: &mut String,
    id: &str,
    rg: &ReadGroupConfig,
    library: Option<&str>,
    platform_unit: &str,
) {
    let _ = write!(text, "@RG\tID:{id}\tPU:{platform_unit}");
    if let Some(sample) = rg.sample.as_deref() {
        let _ = write!(text, "\tSM:{sample}");
    }
    match library.or(rg.library.as_deref()) {
        Some(lb) if !lb.is_empty() => {
            let _ = write!(text, "\tLB:{lb}");
        }
        _ => {}
    }
    if let Some(study) = rg.study.as_deref() {
        let _ = write!(text, "\tDS:{study}");
    }
    if !rg.platform.is_empty() {
        let _ = write!(text, "\tPL:{}", rg.platform);
    }
    text.push('\n');
}

/// Record sink writing unaligned BAM.
pub struct BamSink {
    writer: bam::io::Writer<bgzf::Writer<File>>,
    header: sam::Header,
    barcode_tag: Tag,
    quality_tag: Tag,
}

impl BamSink {
    pub fn create(
        path: &Path,
        header: sam::Header,
        barcode_tag: Tag,
        quality_tag: Tag,
    ) -> Result<Self> {
        let file = File::create(path).map_err(|source| DemuxError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = bam::io::Writer::new(file);
        writer.write_header(&header)?;
        Ok(Self {
            writer,
            header,
            barcode_tag,
            quality_tag,
        })
    }
}

impl RecordSink for BamSink {
    fn append(&mut self, read: &AssembledRead, ctx: &RecordContext<'_>) -> Result<()> {
        let mut record = RecordBuf::default();
        *record.name_mut() = Some(ctx.name.as_bytes().to_vec().into());

        let mut flags = Flags::UNMAPPED;
        match ctx.pairing {
            Pairing::Single => {}
            Pairing::First => {
                flags |= Flags::SEGMENTED | Flags::MATE_UNMAPPED | Flags::FIRST_SEGMENT;
            }
            Pairing::Last => {
                flags |= Flags::SEGMENTED | Flags::MATE_UNMAPPED | Flags::LAST_SEGMENT;
            }
        }
        if ctx.fail_filter {
            flags |= Flags::QC_FAIL;
        }
        *record.flags_mut() = flags;

        *record.sequence_mut() = Sequence::from(read.bases.clone());
        *record.quality_scores_mut() = QualityScores::from(read.quals.clone());

        let data = record.data_mut();
        data.insert(
            Tag::READ_GROUP,
            Value::String(ctx.read_group.as_bytes().to_vec().into()),
        );
        if let Some((bases, quals)) = ctx.index {
            data.insert(self.barcode_tag, Value::String(bases.to_vec().into()));
            let printable: Vec<u8> = quals.iter().map(|q| q.saturating_add(33)).collect();
            data.insert(self.quality_tag, Value::String(printable.into()));
        }

        self.writer.write_alignment_record(&self.header, &record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.try_finish()?;
        Ok(())
    }
}

/// One captured record, for tests and in-process consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub name: String,
    pub read_group: String,
    pub segment: String,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    pub pairing: Pairing,
    pub fail_filter: bool,
    pub index: Option<(Vec<u8>, Vec<u8>)>,
}

/// Record sink that buffers everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<MemoryRecord>,
}

impl RecordSink for MemorySink {
    fn append(&mut self, read: &AssembledRead, ctx: &RecordContext<'_>) -> Result<()> {
        self.records.push(MemoryRecord {
            name: ctx.name.to_string(),
            read_group: ctx.read_group.to_string(),
            segment: read.name.to_string(),
            bases: read.bases.clone(),
            quals: read.quals.clone(),
            pairing: ctx.pairing,
            fail_filter: ctx.fail_filter,
            index: ctx.index.map(|(b, q)| (b.to_vec(), q.to_vec())),
        });
        Ok(())
    }
}
