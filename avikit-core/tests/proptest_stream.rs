//! Property-based tests for the stream model and format descriptors.

use avikit_core::stream::search_positions;
use avikit_core::{BitmapInfo, FindFlags, FourCC};
use proptest::prelude::*;

fn sorted_positions() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(-50i64..500, 0..40).prop_map(|s| s.into_iter().collect())
}

// =============================================================================
// Position search
// =============================================================================

proptest! {
    /// Forward search returns the first position at or after `pos`.
    #[test]
    fn search_next_matches_scan(positions in sorted_positions(), pos in -60i64..520) {
        let expected = positions.iter().copied().find(|p| *p >= pos);
        prop_assert_eq!(search_positions(&positions, pos, FindFlags::NEXT), expected);
    }

    /// Backward search returns the last position at or before `pos`, and is
    /// the default when no direction is given.
    #[test]
    fn search_prev_matches_scan(positions in sorted_positions(), pos in -60i64..520) {
        let expected = positions.iter().copied().rev().find(|p| *p <= pos);
        prop_assert_eq!(search_positions(&positions, pos, FindFlags::PREV), expected);
        prop_assert_eq!(search_positions(&positions, pos, FindFlags::KEY), expected);
    }

    #[test]
    fn search_from_start_ignores_pos(positions in sorted_positions(), pos in any::<i64>()) {
        prop_assert_eq!(
            search_positions(&positions, pos, FindFlags::FROM_START | FindFlags::NEXT),
            positions.first().copied()
        );
    }
}

// =============================================================================
// Bitmap descriptors
// =============================================================================

proptest! {
    /// Scan lines are DWORD aligned and hold every pixel.
    #[test]
    fn stride_is_aligned(width in 1i32..4096, height in -2048i32..2048, bits in prop::sample::select(vec![1u16, 4, 8, 16, 24, 32])) {
        let bmi = BitmapInfo::rgb(width, height, bits);
        let stride = bmi.stride();
        prop_assert_eq!(stride % 4, 0);
        prop_assert!(stride * 8 >= width as usize * bits as usize);
        prop_assert!(stride * 8 < width as usize * bits as usize + 32);
        prop_assert_eq!(bmi.frame_size(), stride * height.unsigned_abs() as usize);
    }

    #[test]
    fn bitmap_extra_bytes_survive(extra in prop::collection::vec(any::<u8>(), 0..64), tag in any::<[u8; 4]>()) {
        let bmi = BitmapInfo {
            compression: FourCC::new(tag),
            extra,
            ..BitmapInfo::rgb(320, -240, 24)
        };
        let parsed = BitmapInfo::parse(&bmi.to_bytes()).unwrap();
        prop_assert_eq!(parsed, bmi);
    }
}
