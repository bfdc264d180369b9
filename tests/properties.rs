//! Property-based checks over the grid state machine's structural
//! invariants, independent of any dictionary content.

use cuvinte_incrucisate::grid::{CellType, Coord, Direction, Grid};
use proptest::collection::vec;
use proptest::prelude::*;

fn arb_dims() -> impl Strategy<Value = (usize, usize)> {
    (3usize..12, 3usize..12)
}

proptest! {
    /// I1: no two clue boxes ever end up orthogonally adjacent, no matter
    /// which sequence of cells a caller tries to plant them at.
    #[test]
    fn no_two_clue_boxes_are_ever_adjacent((height, width) in arb_dims(), attempts in vec((0usize..12, 0usize..12), 0..40)) {
        let mut grid = Grid::new(height, width);
        for (r, c) in attempts {
            if r < height && c < width {
                let _ = grid.place_clue_box(r, c);
            }
        }
        for r in 0..height {
            for c in 0..width {
                if grid.get(r, c) == CellType::ClueBox {
                    for (dr, dc) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                        let nr = r as i64 + dr;
                        let nc = c as i64 + dc;
                        if nr >= 0 && nc >= 0 && (nr as usize) < height && (nc as usize) < width {
                            prop_assert_ne!(grid.get(nr as usize, nc as usize), CellType::ClueBox);
                        }
                    }
                }
            }
        }
    }

    /// I3: the bottom-right 2x2 region never holds a clue box, regardless
    /// of what a caller attempts to plant there.
    #[test]
    fn bottom_right_region_never_becomes_a_clue_box((height, width) in arb_dims(), attempts in vec((0usize..12, 0usize..12), 0..40)) {
        let mut grid = Grid::new(height, width);
        for (r, c) in attempts {
            if r < height && c < width {
                let _ = grid.place_clue_box(r, c);
            }
        }
        for r in height - 2..height {
            for c in width - 2..width {
                prop_assert_ne!(grid.get(r, c), CellType::ClueBox);
            }
        }
    }

    /// P: snapshot/rollback is a perfect inverse regardless of how many
    /// mutations happened in between.
    #[test]
    fn rollback_restores_the_pre_snapshot_grid((height, width) in arb_dims(), attempts in vec((0usize..12, 0usize..12), 0..20)) {
        let mut grid = Grid::new(height, width);
        let before: Vec<Vec<CellType>> = (0..height)
            .map(|r| (0..width).map(|c| grid.get(r, c)).collect())
            .collect();
        let token = grid.snapshot();
        for (r, c) in attempts {
            if r < height && c < width {
                let _ = grid.place_clue_box(r, c);
            }
        }
        grid.rollback(token).unwrap();
        for r in 0..height {
            for c in 0..width {
                prop_assert_eq!(grid.get(r, c), before[r][c]);
            }
        }
    }

    /// Every maximal run returned by `runs_of` is contiguous in its
    /// direction and bounded by either the grid edge or a non-fillable
    /// cell on both ends.
    #[test]
    fn runs_are_contiguous_and_maximal((height, width) in arb_dims(), attempts in vec((0usize..12, 0usize..12), 0..25)) {
        let mut grid = Grid::new(height, width);
        for (r, c) in attempts {
            if r < height && c < width {
                let _ = grid.place_clue_box(r, c);
            }
        }
        for direction in [Direction::Across, Direction::Down] {
            for run in grid.runs_of(direction) {
                prop_assert!(!run.is_empty());
                for window in run.windows(2) {
                    let Coord { row: r0, col: c0 } = window[0];
                    let Coord { row: r1, col: c1 } = window[1];
                    match direction {
                        Direction::Across => {
                            prop_assert_eq!(r0, r1);
                            prop_assert_eq!(c1, c0 + 1);
                        }
                        Direction::Down => {
                            prop_assert_eq!(c0, c1);
                            prop_assert_eq!(r1, r0 + 1);
                        }
                    }
                }
            }
        }
    }
}
