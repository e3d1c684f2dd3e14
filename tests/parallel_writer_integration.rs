//! Integration tests for the parallel BGZF writer
//!
//! These tests drive the public API end to end: open a sink, write, close,
//! then decode the file with a plain gzip reader.

use flate2::read::MultiGzDecoder;
use ordered_bgzf::io::DataSink;
use ordered_bgzf::{BgzfError, ParallelBgzfWriter, WriterConfig, BGZF_BLOCK_SIZE, BGZF_EOF};
use proptest::prelude::*;
use std::fs;
use std::io::Read;
use std::sync::mpsc;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Block sizes read from each block's BSIZE field
fn block_sizes(data: &[u8]) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let bsize = u16::from_le_bytes([data[pos + 16], data[pos + 17]]) as usize + 1;
        sizes.push(bsize);
        pos += bsize;
    }
    sizes
}

fn fastq_records(n: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..n {
        data.extend_from_slice(
            format!("@read_{}\n{}\n+\n{}\n", i, "ACGT".repeat(25), "I".repeat(100)).as_bytes(),
        );
    }
    data
}

/// Write FASTQ records to a .bgz file and read them back
#[test]
fn test_file_round_trip() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reads.fq.bgz");
    let data = fastq_records(20_000);

    {
        let config = WriterConfig::default().with_workers(4);
        let mut writer = ParallelBgzfWriter::from_sink(DataSink::from_path(&path), config).unwrap();
        for record in data.split_inclusive(|&b| b == b'\n') {
            writer.write(record).unwrap();
        }
        writer.close().unwrap();
    }

    let compressed = fs::read(&path).unwrap();
    assert!(compressed.len() < data.len() / 5, "Repeated reads should compress well");
    assert_eq!(&compressed[compressed.len() - BGZF_EOF.len()..], &BGZF_EOF);
    assert_eq!(inflate(&compressed), data);

    let sizes = block_sizes(&compressed);
    let expected_blocks = (data.len() + BGZF_BLOCK_SIZE - 1) / BGZF_BLOCK_SIZE;
    assert_eq!(sizes.len(), expected_blocks + 1);
}

/// Seventy thousand bytes in one call: two data blocks, then EOF
#[test]
fn test_seventy_thousand_bytes_scenario() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scenario.bgz");
    let data: Vec<u8> = (0..70_000u32).map(|i| (i % 97) as u8).collect();

    let config = WriterConfig::default().with_workers(4);
    let mut writer = ParallelBgzfWriter::from_sink(DataSink::from_path(&path), config).unwrap();
    assert_eq!(writer.write(&data).unwrap(), 70_000);
    writer.close().unwrap();

    let compressed = fs::read(&path).unwrap();
    let sizes = block_sizes(&compressed);
    assert_eq!(sizes.len(), 3);
    assert_eq!(*sizes.last().unwrap(), BGZF_EOF.len());
    assert_eq!(inflate(&compressed), data);
}

/// Zero bytes then close: the file is exactly the EOF marker
#[test]
fn test_empty_file_is_eof_only() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.bgz");

    let writer = ParallelBgzfWriter::from_sink(DataSink::from_path(&path), WriterConfig::default()).unwrap();
    writer.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), BGZF_EOF.to_vec());
}

/// Invalid levels are rejected before the file is created
#[test]
fn test_invalid_level_creates_no_file() {
    let temp_dir = TempDir::new().unwrap();

    for level in [10, -2] {
        let path = temp_dir.path().join(format!("level_{}.bgz", level));
        let config = WriterConfig::default().with_level(level);
        let err = ParallelBgzfWriter::from_sink(DataSink::from_path(&path), config).unwrap_err();

        assert!(err.is_config());
        assert!(matches!(err, BgzfError::InvalidCompressionLevel(l) if l == level));
        assert!(!path.exists());
    }
}

/// Every compression level produces a readable stream
#[test]
fn test_all_levels_round_trip() {
    let data = fastq_records(2_000);
    for level in -1..=9 {
        let config = WriterConfig::default().with_workers(2).with_level(level);
        let mut writer = ParallelBgzfWriter::with_config(Vec::new(), config).unwrap();
        writer.write(&data).unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(inflate(&out), data, "level {}", level);
    }
}

/// One thousand writes of 100 bytes equal one write of 100,000 bytes
#[test]
fn test_small_writes_scenario() {
    let data: Vec<u8> = (0..100_000u32).map(|i| b"ACGT"[(i % 4) as usize]).collect();

    let mut small = ParallelBgzfWriter::with_config(Vec::new(), WriterConfig::default().with_workers(4)).unwrap();
    for chunk in data.chunks(100) {
        small.write(chunk).unwrap();
    }
    let small = small.finish().unwrap();

    let mut single = ParallelBgzfWriter::with_config(Vec::new(), WriterConfig::default().with_workers(4)).unwrap();
    single.write(&data).unwrap();
    let single = single.finish().unwrap();

    assert_eq!(inflate(&small), inflate(&single));
    assert_eq!(inflate(&small), data);
}

/// Index-style observer: record the compressed offset of every block
#[test]
fn test_observer_builds_block_offsets() {
    init_logging();
    let (tx, rx) = mpsc::channel();
    let mut offset = 0u64;

    let config = WriterConfig::default().with_workers(4).with_block_size(4096);
    let mut writer = ParallelBgzfWriter::with_config(Vec::new(), config).unwrap();
    writer.set_write_handler(move |raw: &[u8], compressed: &[u8]| {
        tx.send((offset, raw.len())).unwrap();
        offset += compressed.len() as u64;
    });

    let data = fastq_records(1_000);
    writer.write(&data).unwrap();
    let out = writer.finish().unwrap();

    let index: Vec<(u64, usize)> = rx.try_iter().collect();
    let sizes = block_sizes(&out);
    assert_eq!(index.len(), sizes.len() - 1);

    let mut expected_offset = 0u64;
    for ((offset, raw_len), size) in index.iter().zip(&sizes) {
        assert_eq!(*offset, expected_offset);
        assert!(*raw_len <= 4096);
        expected_offset += *size as u64;
    }
    assert_eq!(index.iter().map(|(_, len)| len).sum::<usize>(), data.len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any chunking of the input decodes back to the same bytes
    #[test]
    fn prop_round_trip_any_chunking(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        chunk in 1usize..3_000,
        workers in 0usize..4,
        block_size in 512usize..8_192,
    ) {
        let config = WriterConfig::default().with_workers(workers).with_block_size(block_size);
        let mut writer = ParallelBgzfWriter::with_config(Vec::new(), config).unwrap();
        for piece in data.chunks(chunk) {
            prop_assert_eq!(writer.write(piece).unwrap(), piece.len());
        }
        let out = writer.finish().unwrap();

        prop_assert_eq!(inflate(&out), data.clone());
        prop_assert_eq!(&out[out.len() - BGZF_EOF.len()..], &BGZF_EOF[..]);

        let sizes = block_sizes(&out);
        let data_blocks = (data.len() + block_size - 1) / block_size;
        prop_assert_eq!(sizes.len(), data_blocks + 1);
    }

    /// The window never holds more than 16 × max(workers, 1) handles
    #[test]
    fn prop_window_bounded(workers in 0usize..3, blocks in 1usize..80) {
        let config = WriterConfig::default().with_workers(workers).with_block_size(512);
        let mut writer = ParallelBgzfWriter::with_config(Vec::new(), config).unwrap();
        let capacity = 16 * workers.max(1);
        prop_assert_eq!(writer.window_capacity(), capacity);

        for i in 0..blocks {
            writer.write(&vec![i as u8; 512]).unwrap();
            prop_assert!(writer.stats().peak_in_flight <= capacity);
        }
        writer.flush().unwrap();
        let stats = writer.stats();
        prop_assert_eq!(stats.blocks_written, blocks as u64);
        prop_assert!(stats.peak_in_flight <= capacity);
        writer.close().unwrap();
    }
}
