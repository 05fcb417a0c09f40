/// Run-layout resolution from the basecalls and intensities config documents.
use bcl2bam::error::DemuxError;
use bcl2bam::layout::{self, SegmentName};

// ── fixtures ─────────────────────────────────────────────────────────────────

const INTENSITY_XML: &str = r#"<?xml version="1.0"?>
<ImageAnalysis>
  <Run Name="Intensities">
    <Software Name="RTA" Version="1.10.36.0" />
  </Run>
</ImageAnalysis>
"#;

/// Basecalls config with the given reads and barcode-cycle block spliced in.
fn basecall_xml(reads: &str, barcode: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<BaseCallAnalysis>
  <Run Name="BaseCalls">
    <Software Name="Bustard" Version="1.8.1a2" />
    <TileSelection>
      <Lane Index="1">
        <Sample>s</Sample>
        <Tile>1102</Tile>
        <Tile>1101</Tile>
        <Tile>1101</Tile>
      </Lane>
      <Lane Index="2">
        <Tile>2203</Tile>
      </Lane>
    </TileSelection>
    <RunParameters>
      {barcode}
      <Instrument>HS18</Instrument>
      <RunFolderId>110524_0652</RunFolderId>
      {reads}
    </RunParameters>
  </Run>
</BaseCallAnalysis>
"#
    )
}

const TWO_READS_WITH_INDEX: &str = r#"
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>4</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>12</LastCycle></Reads>
"#;

const INDEX_CYCLES_5_TO_12: &str = r#"<Barcode>
        <Cycle>5</Cycle><Cycle>6</Cycle><Cycle>7</Cycle><Cycle>8</Cycle>
        <Cycle>9</Cycle><Cycle>10</Cycle><Cycle>11</Cycle><Cycle>12</Cycle>
      </Barcode>"#;

// ── resolution ───────────────────────────────────────────────────────────────

#[test]
fn resolves_tiles_sorted_and_unique_for_the_requested_lane() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "");
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();
    assert_eq!(layout.tiles, vec![1101, 1102]);
    assert_eq!(layout.lane, 1);

    let layout = layout::from_xml(&xml, INTENSITY_XML, 2).unwrap();
    assert_eq!(layout.tiles, vec![2203]);
}

#[test]
fn joins_instrument_and_run_folder_into_the_run_id() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "");
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();
    assert_eq!(layout.id, "HS18_110524_0652");
}

#[test]
fn captures_software_provenance() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "");
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();
    assert_eq!(layout.basecall_software.name, "Bustard");
    assert_eq!(layout.basecall_software.version, "1.8.1a2");
    assert_eq!(layout.instrument_software.name, "RTA");
}

#[test]
fn without_index_cycles_all_reads_are_templates() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "");
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();
    let names: Vec<SegmentName> = layout.segments.iter().map(|s| s.name).collect();
    assert_eq!(names, vec![SegmentName::Read(1), SegmentName::Read(2)]);
    assert!(layout.index_segment().is_none());
}

#[test]
fn index_cycles_reclassify_the_matching_segment() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, INDEX_CYCLES_5_TO_12);
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();

    let names: Vec<SegmentName> = layout.segments.iter().map(|s| s.name).collect();
    assert_eq!(names, vec![SegmentName::Read(1), SegmentName::Index]);

    let index = layout.index_segment().unwrap();
    assert_eq!((index.first_cycle, index.last_cycle), (5, 12));
    assert_eq!(index.length(), 8);
    assert_eq!(layout.cycle_span(), 12);
}

#[test]
fn three_segments_number_templates_around_the_index() {
    let reads = r#"
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>4</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>12</LastCycle></Reads>
      <Reads Index="3"><FirstCycle>13</FirstCycle><LastCycle>16</LastCycle></Reads>
"#;
    let xml = basecall_xml(reads, INDEX_CYCLES_5_TO_12);
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();

    let names: Vec<SegmentName> = layout.segments.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![SegmentName::Read(1), SegmentName::Index, SegmentName::Read(2)]
    );
    assert_eq!(layout.template_segments().count(), 2);
}

#[test]
fn covered_cycles_skip_gaps_between_segments() {
    let reads = r#"
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>2</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>6</LastCycle></Reads>
"#;
    let xml = basecall_xml(reads, "");
    let layout = layout::from_xml(&xml, INTENSITY_XML, 1).unwrap();
    assert_eq!(layout.covered_cycles(), vec![1, 2, 5, 6]);
    assert_eq!(layout.cycle_span(), 6);
}

// ── failures ─────────────────────────────────────────────────────────────────

fn expect_config_error(basecall: &str, lane: u32) -> String {
    match layout::from_xml(basecall, INTENSITY_XML, lane) {
        Err(DemuxError::Config(message)) => message,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn unmatched_index_cycles_fail() {
    let index = "<Barcode><Cycle>5</Cycle><Cycle>6</Cycle></Barcode>";
    let message = expect_config_error(&basecall_xml(TWO_READS_WITH_INDEX, index), 1);
    assert!(message.contains("index segment not found"), "{message}");
}

#[test]
fn three_reads_without_index_cycles_fail() {
    let reads = r#"
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>4</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>12</LastCycle></Reads>
      <Reads Index="3"><FirstCycle>13</FirstCycle><LastCycle>16</LastCycle></Reads>
"#;
    let message = expect_config_error(&basecall_xml(reads, ""), 1);
    assert!(message.contains("number of reads"), "{message}");
}

#[test]
fn overlapping_segments_fail() {
    let reads = r#"
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>6</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>12</LastCycle></Reads>
"#;
    let message = expect_config_error(&basecall_xml(reads, ""), 1);
    assert!(message.contains("overlap"), "{message}");
}

#[test]
fn unknown_lane_fails() {
    let message = expect_config_error(&basecall_xml(TWO_READS_WITH_INDEX, ""), 7);
    assert!(message.contains("lane 7"), "{message}");
}

#[test]
fn empty_read_list_fails() {
    let message = expect_config_error(&basecall_xml("", ""), 1);
    assert!(message.contains("no reads"), "{message}");
}

#[test]
fn missing_instrument_fails() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "").replace("<Instrument>HS18</Instrument>", "");
    let message = expect_config_error(&xml, 1);
    assert!(message.contains("instrument"), "{message}");
}

#[test]
fn missing_run_folder_fails() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "")
        .replace("<RunFolderId>110524_0652</RunFolderId>", "");
    let message = expect_config_error(&xml, 1);
    assert!(message.contains("run folder"), "{message}");
}

#[test]
fn missing_basecall_software_fails() {
    let xml = basecall_xml(TWO_READS_WITH_INDEX, "")
        .replace(r#"<Software Name="Bustard" Version="1.8.1a2" />"#, "");
    let message = expect_config_error(&xml, 1);
    assert!(message.contains("software"), "{message}");
}
