/// End-to-end run of the bcl2bam binary over a synthesized run folder:
/// resolve the layout from config.xml, stream two tiles of base calls,
/// demultiplex against three barcodes, and read the output BAM back.
use noodles::bam;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

// ── helpers ──────────────────────────────────────────────────────────────────

const LANE: u32 = 1;
const QUAL: u8 = 30;

const INTENSITY_XML: &str = r#"<?xml version="1.0"?>
<ImageAnalysis>
  <Run Name="Intensities">
    <Software Name="RTA" Version="1.10.36.0" />
  </Run>
</ImageAnalysis>
"#;

const BASECALL_XML: &str = r#"<?xml version="1.0"?>
<BaseCallAnalysis>
  <Run Name="BaseCalls">
    <Software Name="Bustard" Version="1.8.1a2" />
    <TileSelection>
      <Lane Index="1">
        <Tile>1101</Tile>
        <Tile>1102</Tile>
      </Lane>
    </TileSelection>
    <RunParameters>
      <Barcode>
        <Cycle>5</Cycle><Cycle>6</Cycle><Cycle>7</Cycle><Cycle>8</Cycle>
        <Cycle>9</Cycle><Cycle>10</Cycle><Cycle>11</Cycle><Cycle>12</Cycle>
      </Barcode>
      <Instrument>HS18</Instrument>
      <RunFolderId>110524_0652</RunFolderId>
      <Reads Index="1"><FirstCycle>1</FirstCycle><LastCycle>4</LastCycle></Reads>
      <Reads Index="2"><FirstCycle>5</FirstCycle><LastCycle>12</LastCycle></Reads>
    </RunParameters>
  </Run>
</BaseCallAnalysis>
"#;

fn encode_call(base: u8) -> u8 {
    let index = match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => return 0,
    };
    (QUAL << 2) | index
}

fn write_tile(basecalls: &Path, tile: u32, clusters: &[(&str, bool)]) {
    let lane_dir = basecalls.join(format!("L{LANE:03}"));
    let count = clusters.len() as u32;

    for cycle in 1..=12u32 {
        let dir = lane_dir.join(format!("C{cycle}.1"));
        fs::create_dir_all(&dir).unwrap();
        let mut bytes = count.to_le_bytes().to_vec();
        for (bases, _) in clusters {
            bytes.push(encode_call(bases.as_bytes()[(cycle - 1) as usize]));
        }
        fs::write(dir.join(format!("s_{LANE}_{tile}.bcl")), bytes).unwrap();
    }

    let mut filter = Vec::new();
    filter.extend_from_slice(&0u32.to_le_bytes());
    filter.extend_from_slice(&3u32.to_le_bytes());
    filter.extend_from_slice(&count.to_le_bytes());
    filter.extend(clusters.iter().map(|&(_, pf)| u8::from(pf)));
    fs::write(lane_dir.join(format!("s_{LANE}_{tile}.filter")), filter).unwrap();
}

/// Build a run folder with config.xml documents and two tiles of data.
fn build_run_folder(root: &Path) -> (PathBuf, PathBuf) {
    let intensities = root.join("Intensities");
    let basecalls = intensities.join("BaseCalls");
    fs::create_dir_all(&basecalls).unwrap();
    fs::write(intensities.join("config.xml"), INTENSITY_XML).unwrap();
    fs::write(basecalls.join("config.xml"), BASECALL_XML).unwrap();

    write_tile(
        &basecalls,
        1101,
        &[
            ("ACGTACAACGCA", true),  // perfect barcode 1
            ("ACGTTGTGAAGA", true),  // one mismatch off barcode 2
            ("ACGTGGGGGGGG", true),  // unmatched
        ],
    );
    write_tile(
        &basecalls,
        1102,
        &[
            ("ACGTCCTTAGTG", false), // perfect barcode 3, fails filter
            ("ACGTACAACGCA", true),  // perfect barcode 1
        ],
    );
    (intensities, basecalls)
}

fn read_names(path: &Path) -> Vec<String> {
    let mut reader = bam::io::reader::Builder
        .build_from_path(path)
        .expect("open BAM");
    reader.read_header().expect("read header");
    let mut names = Vec::new();
    let mut record = bam::Record::default();
    loop {
        match reader.read_record(&mut record) {
            Ok(0) => break,
            Ok(_) => names.push(record.name().map(|n| n.to_string()).unwrap_or_default()),
            Err(e) => panic!("read_record error: {e}"),
        }
    }
    names
}

fn bcl2bam_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bcl2bam"))
}

// ── tests ────────────────────────────────────────────────────────────────────

#[test]
fn demultiplexes_a_synthesized_run_folder() {
    let root = std::env::temp_dir().join(format!("bcl2bam_e2e_{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    let (intensities, basecalls) = build_run_folder(&root);
    let out_bam = root.join("lane1.bam");
    let metrics_file = root.join("metrics.txt");

    let status = Command::new(bcl2bam_bin())
        .arg("-i")
        .arg(&intensities)
        .arg("-b")
        .arg(&basecalls)
        .args(["-l", "1", "--pf-filter", "false", "-q"])
        .args(["--barcode", "ACAACGCA"])
        .args(["--barcode", "TGTGAAGC"])
        .args(["--barcode", "CCTTAGTG"])
        .arg("-o")
        .arg(&out_bam)
        .arg("-m")
        .arg(&metrics_file)
        .status()
        .expect("failed to spawn bcl2bam");
    assert!(status.success(), "bcl2bam exited with status {status}");

    let names = read_names(&out_bam);
    assert_eq!(
        names,
        vec![
            "HS18_110524_0652:1:1101:0#1",
            "HS18_110524_0652:1:1101:1#2",
            "HS18_110524_0652:1:1101:2#0",
            "HS18_110524_0652:1:1102:0#3",
            "HS18_110524_0652:1:1102:1#1",
        ]
    );

    let metrics = fs::read_to_string(&metrics_file).unwrap();
    let data_lines: Vec<&str> = metrics
        .lines()
        .filter(|l| !l.starts_with('#') && !l.starts_with("BARCODE_NAME"))
        .collect();
    assert_eq!(data_lines.len(), 4, "three barcodes plus the unmatched row");

    let reads: Vec<u64> = data_lines
        .iter()
        .map(|l| l.split('\t').nth(3).unwrap().parse().unwrap())
        .collect();
    assert_eq!(reads, vec![2, 1, 1, 1]);
    assert_eq!(reads.iter().sum::<u64>(), 5);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pf_filter_default_drops_failing_clusters_from_the_bam() {
    let root = std::env::temp_dir().join(format!("bcl2bam_e2e_pf_{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    let (intensities, basecalls) = build_run_folder(&root);
    let out_bam = root.join("lane1.bam");

    let status = Command::new(bcl2bam_bin())
        .arg("-i")
        .arg(&intensities)
        .arg("-b")
        .arg(&basecalls)
        .args(["-l", "1", "-q"])
        .args(["--barcode", "ACAACGCA"])
        .args(["--barcode", "TGTGAAGC"])
        .args(["--barcode", "CCTTAGTG"])
        .arg("-o")
        .arg(&out_bam)
        .status()
        .expect("failed to spawn bcl2bam");
    assert!(status.success(), "bcl2bam exited with status {status}");

    let names = read_names(&out_bam);
    assert_eq!(names.len(), 4, "the filter-failing cluster is dropped");
    assert!(!names.contains(&"HS18_110524_0652:1:1102:0#3".to_string()));

    let _ = fs::remove_dir_all(&root);
}
