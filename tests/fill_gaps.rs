use std::path::Path;

use sandtrace::gaps::{BlankFrame, fill_frame_gaps, frame_path};
use tempfile::TempDir;

fn write_frame(dir: &Path, idx: u32, bytes: &[u8]) {
    std::fs::write(frame_path(dir, idx), bytes).unwrap();
}

fn read_frame(dir: &Path, idx: u32) -> Vec<u8> {
    std::fs::read(frame_path(dir, idx)).unwrap()
}

#[test]
fn every_index_has_a_file_after_filling() {
    let dir = TempDir::new().unwrap();
    write_frame(dir.path(), 0, b"zero");
    write_frame(dir.path(), 5, b"five");

    let report = fill_frame_gaps(dir.path(), 8, BlankFrame::black(16, 16)).unwrap();

    for idx in 0..8 {
        assert!(frame_path(dir.path(), idx).exists(), "frame {idx} missing");
    }
    assert_eq!(report.repaired(), 6);
    assert_eq!(report.synthesized, 0);
}

#[test]
fn all_missing_sequence_fills_with_blanks() {
    let dir = TempDir::new().unwrap();

    let report = fill_frame_gaps(dir.path(), 4, BlankFrame::black(32, 24)).unwrap();

    assert_eq!(report.synthesized, 4);
    assert_eq!(report.copied, 0);
    for idx in 0..4 {
        let img = image::open(frame_path(dir.path(), idx)).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (32, 24));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}

#[test]
fn missing_head_becomes_copy_of_next_frame() {
    let dir = TempDir::new().unwrap();
    write_frame(dir.path(), 1, b"one");

    let report = fill_frame_gaps(dir.path(), 2, BlankFrame::black(16, 16)).unwrap();

    assert_eq!(read_frame(dir.path(), 0), b"one");
    assert_eq!(report.copied, 1);
    assert_eq!(report.synthesized, 0);
}

#[test]
fn interior_gap_copies_nearest_earlier_frame() {
    let dir = TempDir::new().unwrap();
    write_frame(dir.path(), 0, b"a");
    write_frame(dir.path(), 1, b"b");
    write_frame(dir.path(), 3, b"d");

    fill_frame_gaps(dir.path(), 4, BlankFrame::black(16, 16)).unwrap();

    assert_eq!(read_frame(dir.path(), 2), b"b");
}

#[test]
fn trailing_gaps_copy_the_last_captured_frame() {
    let dir = TempDir::new().unwrap();
    write_frame(dir.path(), 0, b"a");
    write_frame(dir.path(), 1, b"b");

    let report = fill_frame_gaps(dir.path(), 5, BlankFrame::black(16, 16)).unwrap();

    assert_eq!(read_frame(dir.path(), 2), b"b");
    assert_eq!(read_frame(dir.path(), 3), b"b");
    assert_eq!(read_frame(dir.path(), 4), b"b");
    assert_eq!(report.copied, 3);
}

#[test]
fn complete_sequence_is_left_untouched() {
    let dir = TempDir::new().unwrap();
    write_frame(dir.path(), 0, b"a");
    write_frame(dir.path(), 1, b"b");

    let report = fill_frame_gaps(dir.path(), 2, BlankFrame::black(16, 16)).unwrap();

    assert_eq!(report.repaired(), 0);
    assert_eq!(read_frame(dir.path(), 0), b"a");
    assert_eq!(read_frame(dir.path(), 1), b"b");
}
