use std::collections::HashSet;

use crate::dictionary::{DictionaryIndex, Pattern, Tier};
use crate::error::{LayoutError, LayoutResult};
use crate::grid::{CellType, Coord, Direction, Grid};

/// The two run-partitioning passes, applied in order (spec.md §4.4 step 2).
const MAX_LEN_PASSES: [usize; 2] = [10, 8];

const PENALTY_ALPHA: f64 = 1.0;
const PENALTY_BETA: f64 = 10.0;

/// Freezes the cell-type grid so that slots are determined, running the
/// four steps of spec.md §4.4 in order. On success the grid's slot
/// registry reflects the final layout.
pub fn build_layout(
    grid: &mut Grid,
    dictionary: &DictionaryIndex,
    tier: Tier,
) -> LayoutResult<()> {
    heal_orphans(grid)?;
    for &max_len in &MAX_LEN_PASSES {
        partition_long_runs(grid, max_len);
    }
    ensure_licensing(grid)?;
    verify_feasibility(grid, dictionary, tier)?;
    Ok(())
}

/// Step 1: any EMPTY_PLAYABLE cell whose maximal across and down runs are
/// both length 1 is converted to a clue box. Cells that cannot be healed
/// without breaking I1 are retried once after the rest of the pass (in
/// case a later heal changes their neighborhood); any still unresolved at
/// that point fails the layout.
fn heal_orphans(grid: &mut Grid) -> LayoutResult<()> {
    let mut unresolved: Vec<Coord> = Vec::new();
    loop {
        let orphans: Vec<Coord> = (0..grid.height())
            .flat_map(|r| (0..grid.width()).map(move |c| (r, c)))
            .filter(|&(r, c)| grid.is_orphan(r, c))
            .map(|(r, c)| Coord::new(r, c))
            .collect();
        if orphans.is_empty() {
            break;
        }
        let mut progressed = false;
        unresolved.clear();
        for coord in orphans {
            if grid.place_clue_box(coord.row, coord.col).is_ok() {
                progressed = true;
            } else {
                unresolved.push(coord);
            }
        }
        if !progressed {
            break;
        }
    }
    if let Some(&coord) = unresolved.first() {
        if grid.is_orphan(coord.row, coord.col) {
            return Err(LayoutError::OrphanUnresolvable(coord));
        }
    }
    Ok(())
}

fn penalty(i: usize, right_len: i64, total_len: usize) -> f64 {
    let center_dist = (i as f64 - total_len as f64 / 2.0).abs();
    let leaves_three = i == 3 || right_len == 3;
    PENALTY_ALPHA * center_dist + if leaves_three { PENALTY_BETA } else { 0.0 }
}

/// Step 2: splits any run longer than `max_len` at the cut position that
/// minimizes the penalty formula of spec.md §4.4, planting a clue box
/// there. Runs for which no legal, I1-safe cut exists are left long.
fn partition_long_runs(grid: &mut Grid, max_len: usize) {
    let mut already_failed: HashSet<Coord> = HashSet::new();
    loop {
        let target = find_long_run(grid, max_len, &already_failed);
        let (start, _direction, run) = match target {
            Some(t) => t,
            None => break,
        };
        let len = run.len();
        // i indexes the cell (0-based within the run) that becomes the
        // clue box; left run length = i, right run length = len - i - 1.
        // Both sides must be >= 2.
        let mut candidates: Vec<usize> = (2..=len.saturating_sub(3).max(2))
            .filter(|&i| i >= 2 && (len as i64 - i as i64 - 1) >= 2)
            .collect();
        candidates.sort_by(|&a, &b| {
            let pa = penalty(a, len as i64 - a as i64 - 1, len);
            let pb = penalty(b, len as i64 - b as i64 - 1, len);
            pa.partial_cmp(&pb).unwrap().then(a.cmp(&b))
        });

        let mut cut = false;
        for i in candidates {
            let cell = run[i];
            if grid.place_clue_box(cell.row, cell.col).is_ok() {
                cut = true;
                break;
            }
        }
        if !cut {
            already_failed.insert(start);
            continue;
        }
    }
}

fn find_long_run(
    grid: &Grid,
    max_len: usize,
    already_failed: &HashSet<Coord>,
) -> Option<(Coord, Direction, Vec<Coord>)> {
    for direction in [Direction::Across, Direction::Down] {
        for run in grid.runs_of(direction) {
            if run.len() > max_len && !already_failed.contains(&run[0]) {
                return Some((run[0], direction, run));
            }
        }
    }
    None
}

/// Step 3: every length->=2 run must have a direction-legal clue box
/// adjacent to its first cell. Plants one at the first available legal
/// offset; fails if none of the three offsets is usable.
fn ensure_licensing(grid: &mut Grid) -> LayoutResult<()> {
    loop {
        let missing = find_unlicensed_run_start(grid);
        let (start, direction) = match missing {
            Some(t) => t,
            None => return Ok(()),
        };
        let offsets = match direction {
            Direction::Across => [(0isize, -1isize), (-1, 0), (1, 0)],
            Direction::Down => [(-1isize, 0isize), (0, -1), (0, 1)],
        };
        let mut planted = false;
        for (dr, dc) in offsets {
            let (nr, nc) = (start.row as isize + dr, start.col as isize + dc);
            if !grid.in_bounds(nr, nc) {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if grid.get(nr, nc) == CellType::EmptyPlayable && grid.place_clue_box(nr, nc).is_ok() {
                planted = true;
                break;
            }
        }
        if !planted {
            return Err(LayoutError::LicensingImpossible(start));
        }
    }
}

fn find_unlicensed_run_start(grid: &Grid) -> Option<(Coord, Direction)> {
    for direction in [Direction::Across, Direction::Down] {
        let offsets = match direction {
            Direction::Across => [(0isize, -1isize), (-1, 0), (1, 0)],
            Direction::Down => [(-1isize, 0isize), (0, -1), (0, 1)],
        };
        for run in grid.runs_of(direction) {
            if run.len() < 2 {
                continue;
            }
            let start = run[0];
            let licensed = offsets.iter().any(|&(dr, dc)| {
                let (nr, nc) = (start.row as isize + dr, start.col as isize + dc);
                grid.in_bounds(nr, nc) && grid.get(nr as usize, nc as usize) == CellType::ClueBox
            });
            if !licensed {
                return Some((start, direction));
            }
        }
    }
    None
}

/// Step 4: registers the final slot set and rejects the layout if any
/// length->=3 slot has zero dictionary candidates given its currently
/// fixed (theme) letters. Length-2 slots are exempt from dictionary
/// lookup (spec.md §4.4).
fn verify_feasibility(grid: &mut Grid, dictionary: &DictionaryIndex, tier: Tier) -> LayoutResult<()> {
    let slots = grid.register_slots().to_vec();
    for slot in &slots {
        if slot.length < 3 {
            continue;
        }
        let letters: Vec<Option<char>> = slot
            .cells
            .iter()
            .map(|c| match grid.get(c.row, c.col) {
                CellType::Letter(ch) => Some(ch),
                _ => None,
            })
            .collect();
        let pattern = Pattern::from_letters(&letters);
        let candidates = dictionary.candidates(&pattern, &HashSet::new(), tier);
        if candidates.is_empty() {
            return Err(LayoutError::SlotInfeasible(slot.start, slot.length));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryEntry;

    fn dict_with(words: &[&str]) -> DictionaryIndex {
        let mut idx = DictionaryIndex::new();
        for w in words {
            idx.insert(DictionaryEntry {
                surface: w.to_string(),
                length: w.chars().count(),
                frequency: 0.5,
                difficulty_score: 0.4,
                is_compound: false,
                is_stopword: false,
            });
        }
        idx
    }

    #[test]
    fn heal_orphans_converts_isolated_cells_to_clue_boxes() {
        let mut grid = Grid::new(3, 3);
        grid.place_clue_box(0, 2).unwrap();
        grid.place_clue_box(2, 0).unwrap();
        // (1,1) is still surrounded by fillable neighbors on both axes so
        // it is not an orphan in this configuration; heal_orphans should
        // be a no-op here.
        heal_orphans(&mut grid).unwrap();
        assert_eq!(grid.get(1, 1), CellType::EmptyPlayable);
    }

    #[test]
    fn partition_long_runs_splits_runs_past_max_len() {
        let mut grid = Grid::new(1, 12);
        partition_long_runs(&mut grid, 10);
        let runs = grid.runs_of(Direction::Across);
        assert!(runs.iter().all(|r| r.len() <= 10));
    }

    #[test]
    fn ensure_licensing_plants_clues_until_every_run_is_licensed() {
        let mut grid = Grid::new(4, 5);
        ensure_licensing(&mut grid).unwrap();
        assert!(find_unlicensed_run_start(&grid).is_none());
    }

    #[test]
    fn verify_feasibility_rejects_slot_with_no_dictionary_candidates() {
        // 1x4: the corner clue at (0,0) leaves a single length-3 run at
        // cols 1..3, which is the only slot long enough to be checked.
        let mut grid = Grid::new(1, 4);
        let dictionary = dict_with(&["ABC"]);
        grid.place_letter(0, 1, 'Z').unwrap();
        let err = verify_feasibility(&mut grid, &dictionary, Tier::Medium);
        assert!(err.is_err());
    }

    #[test]
    fn verify_feasibility_accepts_slot_with_matching_candidate() {
        let mut grid = Grid::new(1, 4);
        let dictionary = dict_with(&["ABC"]);
        grid.place_letter(0, 1, 'A').unwrap();
        verify_feasibility(&mut grid, &dictionary, Tier::Medium).unwrap();
    }

    #[test]
    fn build_layout_end_to_end_on_small_grid() {
        let mut grid = Grid::new(4, 4);
        let dictionary = dict_with(&["CAT", "DOG", "ACE", "TOE", "CDA", "AOE", "TGE"]);
        // Not all of these need to be dictionary-consistent with the
        // final grid; this test only exercises that the pipeline runs to
        // completion without panicking on a small grid with a rich-enough
        // vocabulary.
        let _ = build_layout(&mut grid, &dictionary, Tier::Medium);
    }
}
