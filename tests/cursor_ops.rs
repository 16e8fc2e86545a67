//! # Cursor Integration Tests
//!
//! Exercises fixed and sliding cursors end to end against real files:
//! byte-exact round trips, next_cursor chaining, release semantics, and
//! the window-blindness of sliding reads.

use std::fs;
use std::path::PathBuf;

use tempfile::{tempdir, TempDir};
use winmap::{GreedyManager, MapError, TilingManager};

/// 20 bytes, all zero except the final byte = 0xEE.
fn marker_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("marker.bin");
    let mut data = vec![0u8; 20];
    data[19] = 0xEE;
    fs::write(&path, data).unwrap();
    path
}

fn patterned_file(dir: &TempDir, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &data).unwrap();
    (path, data)
}

fn kind(err: &eyre::Report) -> Option<&MapError> {
    err.downcast_ref::<MapError>()
}

mod fixed_cursor {
    use super::*;

    #[test]
    fn whole_file_cursor_exposes_every_byte() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();

        assert_eq!(c.ofs(), 0);
        assert_eq!(c.size(), 20);
        let buf = c.buffer().unwrap();
        assert_eq!(buf[0], 0);
        assert_eq!(buf[19], 0xEE);
    }

    #[test]
    fn release_is_single_shot() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        c.release().unwrap();

        let err = c.release().unwrap_err();
        assert_eq!(kind(&err), Some(&MapError::AlreadyReleased));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        c.close();
        c.close();

        assert!(c.closed());
        assert_eq!(mman.num_open_cursors(), 0);
    }

    #[test]
    fn next_cursor_advances_to_the_tail() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c2 = mman.make_cursor_at(&path, 10, 5).unwrap();
        assert_eq!(c2.ofs(), 10);
        assert_eq!(c2.size(), 5);

        let c3 = c2.next_cursor().unwrap();
        assert_eq!(c3.ofs(), 15);
        assert_eq!(c3.size(), 5);
        assert_eq!(c3.buffer().unwrap()[4], 0xEE);
    }

    #[test]
    fn next_cursor_past_eof_is_out_of_range() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c3 = mman.make_cursor_at(&path, 15, 5).unwrap();
        let err = c3.next_cursor().unwrap_err();

        assert!(matches!(
            kind(&err),
            Some(&MapError::OutOfRange {
                offset: 20,
                file_size: 20,
                ..
            })
        ));
    }

    #[test]
    fn buffer_round_trips_arbitrary_ranges() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "pat.bin", 10_000);
        let mman = TilingManager::new();

        for (offset, size) in [(0u64, 10_000usize), (1, 1), (4095, 2), (9_000, 1_000), (9_999, 1)] {
            let c = mman.make_cursor_at(&path, offset, size).unwrap();
            let buf = c.buffer().unwrap();
            assert_eq!(&*buf, &data[offset as usize..offset as usize + size]);
        }
    }

    #[test]
    fn next_cursor_chain_concatenates_the_file() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "walk.bin", 20);
        let mman = TilingManager::new();

        let mut out = Vec::new();
        let mut cursor = mman.make_cursor_at(&path, 0, 8).unwrap();
        loop {
            out.extend_from_slice(&cursor.buffer().unwrap());
            match cursor.next_cursor() {
                Ok(next) => cursor = next,
                Err(err) => {
                    assert!(matches!(kind(&err), Some(&MapError::OutOfRange { .. })));
                    break;
                }
            }
        }

        assert_eq!(out, data);
    }

    #[test]
    fn size_zero_spans_to_eof() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor_at(&path, 5, 0).unwrap();

        assert_eq!(c.ofs(), 5);
        assert_eq!(c.size(), 15);
        assert_eq!(c.ofs_end(), 20);
        assert!(c.includes_ofs(5));
        assert!(c.includes_ofs(19));
        assert!(!c.includes_ofs(20));
    }

    #[test]
    fn offset_at_eof_is_out_of_range() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        for size in [0usize, 5] {
            let err = mman.make_cursor_at(&path, 20, size).unwrap_err();
            assert!(matches!(kind(&err), Some(&MapError::OutOfRange { .. })));
        }
    }

    #[test]
    fn oversized_request_clamps_to_eof() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor_at(&path, 10, 1_000).unwrap();

        assert_eq!(c.size(), 10);
        assert_eq!(c.buffer().unwrap().len(), 10);
    }

    #[test]
    fn make_cursor_rehomes_on_same_file() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "rehome.bin", 100);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        let c = c.make_cursor(40, 10).unwrap();

        assert_eq!(c.ofs(), 40);
        assert_eq!(&*c.buffer().unwrap(), &data[40..50]);
        assert_eq!(mman.num_open_cursors(), 1);
    }

    #[test]
    fn buffer_fails_after_cursor_close() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        c.close();

        let err = c.buffer().unwrap_err();
        assert_eq!(kind(&err), Some(&MapError::Closed));
    }

    #[test]
    fn buffer_fails_after_manager_close() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        mman.close();

        assert!(c.closed());
        assert_eq!(kind(&c.buffer().unwrap_err()), Some(&MapError::Closed));
        assert_eq!(mman.num_open_cursors(), 0);
    }

    #[test]
    fn view_outlives_manager_bookkeeping() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_cursor(&path).unwrap();
        let view = c.buffer().unwrap();
        mman.close();

        // the view shares ownership of the mapping; bytes stay valid even
        // though the manager no longer accounts for the region
        assert_eq!(view[19], 0xEE);
        assert_eq!(mman.mapped_memory_size(), 0);
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        fs::write(&path, []).unwrap();
        let mman = TilingManager::new();

        let err = mman.make_cursor(&path).unwrap_err();
        assert!(matches!(kind(&err), Some(&MapError::EmptyFile { .. })));
    }
}

mod sliding_cursor {
    use super::*;

    #[test]
    fn windowed_reads_open_separate_regions() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::builder().window_size(5).build();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();

        assert_eq!(c.byte(0).unwrap(), 0);
        assert_eq!(mman.num_used_regions(), 0);

        assert_eq!(c.byte(5).unwrap(), 0);
        assert_eq!(mman.num_open_regions(), 2);
        assert_eq!(mman.num_used_regions(), 0);
    }

    #[test]
    fn bytes_match_file_regardless_of_windows() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "slide.bin", 200);
        let mman = TilingManager::builder().window_size(16).build();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();

        for i in 0..200i64 {
            assert_eq!(c.byte(i).unwrap(), data[i as usize], "byte {i}");
        }
    }

    #[test]
    fn negative_indices_resolve_from_eof() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();

        assert_eq!(c.byte(-1).unwrap(), 0xEE);
        assert_eq!(c.byte(-20).unwrap(), 0);
        assert!(matches!(
            kind(&c.byte(-21).unwrap_err()),
            Some(&MapError::OutOfRange { .. })
        ));
    }

    #[test]
    fn slice_straddling_windows_concatenates() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "straddle.bin", 20);
        let mman = TilingManager::builder().window_size(5).build();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();

        assert_eq!(c.slice(0, 20).unwrap(), data);
        assert_eq!(c.slice(3, 18).unwrap(), &data[3..18]);
        assert_eq!(c.slice(-20, -1).unwrap(), &data[0..19]);
        assert_eq!(c.slice(7, 7).unwrap(), Vec::<u8>::new());
        assert_eq!(mman.num_used_regions(), 0);
    }

    #[test]
    fn out_of_range_access_fails() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();

        assert!(matches!(
            kind(&c.byte(20).unwrap_err()),
            Some(&MapError::OutOfRange { .. })
        ));
        assert!(matches!(
            kind(&c.slice(5, 21).unwrap_err()),
            Some(&MapError::OutOfRange { .. })
        ));
    }

    #[test]
    fn bounded_cursor_restricts_the_range() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "bounded.bin", 100);
        let mman = TilingManager::new();

        let c = mman.make_sliding_cursor(&path, 10, 30).unwrap();

        assert_eq!(c.ofs(), 10);
        assert_eq!(c.size(), 30);
        assert_eq!(c.byte(10).unwrap(), data[10]);
        assert_eq!(c.slice(10, 40).unwrap(), &data[10..40]);
        assert!(matches!(
            kind(&c.byte(9).unwrap_err()),
            Some(&MapError::OutOfRange { .. })
        ));
        assert!(matches!(
            kind(&c.byte(40).unwrap_err()),
            Some(&MapError::OutOfRange { .. })
        ));
    }

    #[test]
    fn close_is_ignored_by_design() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();
        c.close();

        assert!(!c.closed());
        assert_eq!(mman.num_open_cursors(), 1);
        assert_eq!(c.byte(0).unwrap(), 0);
    }

    #[test]
    fn manager_close_does_close_it() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = TilingManager::new();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();
        mman.close();

        assert!(c.closed());
        assert_eq!(kind(&c.byte(0).unwrap_err()), Some(&MapError::Closed));
    }

    #[test]
    fn greedy_manager_cannot_slide() {
        let dir = tempdir().unwrap();
        let path = marker_file(&dir);
        let mman = GreedyManager::new();

        let err = mman.make_sliding_cursor(&path, 0, 0).unwrap_err();
        assert_eq!(kind(&err), Some(&MapError::Unsupported));
    }

    #[test]
    fn to_vec_reads_the_whole_range() {
        let dir = tempdir().unwrap();
        let (path, data) = patterned_file(&dir, "whole.bin", 64);
        let mman = TilingManager::builder().window_size(7).build();

        let c = mman.make_sliding_cursor(&path, 0, 0).unwrap();
        assert_eq!(c.to_vec().unwrap(), data);
    }
}
