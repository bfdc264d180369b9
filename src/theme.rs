use rand::seq::SliceRandom;
use rand::Rng as _;
use rand_chacha::ChaCha8Rng;

use std::collections::HashSet;

use crate::dictionary::{DictionaryIndex, Pattern, Tier};
use crate::error::{PlacementError, PlacementResult};
use crate::grid::{CellType, Coord, Direction, Grid, Rect};

/// Where a theme entry (or, later, a fill word) came from. The core never
/// branches on this beyond skipping crossing-feasibility checks for `User`
/// entries (spec.md §4.3, §9 "capability set" note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Dummy,
    Gemini,
    Fill,
}

/// A word supplied to the generator prior to layout, with an optional
/// pre-assigned clue.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThemeEntry {
    pub word: String,
    pub clue: Option<String>,
    pub source: Source,
}

impl ThemeEntry {
    pub fn new(word: impl Into<String>, source: Source) -> Self {
        ThemeEntry {
            word: word.into(),
            clue: None,
            source,
        }
    }
}

/// A theme entry that was successfully planted in the grid.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlacedTheme {
    pub entry: ThemeEntry,
    pub start: Coord,
    pub direction: Direction,
}

/// Placement of the blocker rectangle: `None` leaves the grid without a
/// blocker zone, `Some` pins dimensions and/or origin, leaving the rest to
/// the seeded RNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct BlockerSpec {
    pub height: Option<usize>,
    pub width: Option<usize>,
    pub row: Option<usize>,
    pub col: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

const CORNERS: [Corner; 5] = [
    Corner::TopLeft,
    Corner::TopRight,
    Corner::BottomLeft,
    Corner::BottomRight,
    Corner::Center,
];

/// Applies the (optional) blocker rectangle to a fresh grid, choosing any
/// dimensions/placement left unspecified via the seeded RNG.
pub fn apply_blocker(
    grid: &mut Grid,
    spec: Option<BlockerSpec>,
    rng: &mut ChaCha8Rng,
) -> PlacementResult<()> {
    let spec = match spec {
        None => return Ok(()),
        Some(s) => s,
    };
    let max_h = (grid.height() / 2).min(6).max(3);
    let max_w = (grid.width() / 2).min(6).max(3);
    let height = spec.height.unwrap_or_else(|| rng.gen_range(3..=max_h));
    let width = spec.width.unwrap_or_else(|| rng.gen_range(3..=max_w));

    let (row, col) = if spec.row.is_some() || spec.col.is_some() {
        (spec.row.unwrap_or(0), spec.col.unwrap_or(0))
    } else {
        let corner = *CORNERS.choose(rng).unwrap();
        match corner {
            Corner::TopLeft => (0, 0),
            Corner::TopRight => (0, grid.width().saturating_sub(width)),
            Corner::BottomLeft => (grid.height().saturating_sub(height), 0),
            Corner::BottomRight => (
                grid.height().saturating_sub(height),
                grid.width().saturating_sub(width),
            ),
            Corner::Center => (
                (grid.height().saturating_sub(height)) / 2,
                (grid.width().saturating_sub(width)) / 2,
            ),
        }
    };

    grid.set_blocker(Rect {
        row,
        col,
        height,
        width,
    })
}

/// A rough estimate of how many slots a grid of this size will ultimately
/// carry, used only to size the theme-word coverage target. The source
/// spec leaves the exact formula unstated; this implementation assumes
/// roughly one slot per row and one per column, which is documented as an
/// explicit assumption in DESIGN.md.
fn expected_slot_count(grid: &Grid) -> usize {
    grid.height() + grid.width()
}

/// Attempts to plant theme words onto the grid in list order, per spec.md
/// §4.3. `words_only_mode` disables the minimum-coverage requirement
/// (used when every entry's source is `User`, e.g. scenario S3). Candidate
/// positions for any entry whose source is not `User` are additionally
/// required to leave every length->=3 crossing slot dictionary-feasible;
/// `User` entries skip that check and take responsibility for their own
/// crossings (spec.md §4.3).
pub fn place_theme_words(
    grid: &mut Grid,
    entries: &[ThemeEntry],
    words_only_mode: bool,
    tier: Tier,
    dictionary: &DictionaryIndex,
    rng: &mut ChaCha8Rng,
) -> PlacementResult<Vec<PlacedTheme>> {
    let k_raw = ((0.4 * expected_slot_count(grid) as f64).floor() as usize).min(entries.len());
    let target = if words_only_mode {
        k_raw
    } else {
        k_raw.max(2).min(entries.len())
    };
    if !words_only_mode && target < 2 {
        return Err(PlacementError::ThemePlacementFailed);
    }

    let mut placed = Vec::new();
    let mut pending: Vec<&ThemeEntry> = entries.iter().collect();

    for entry in entries {
        if placed.len() >= target && !words_only_mode {
            break;
        }
        pending.retain(|e| e.word != entry.word);
        let normalized: Vec<char> = entry.word.chars().collect();
        if normalized.len() < 2 {
            continue;
        }
        let mut candidates =
            candidate_positions(grid, &normalized, entry.source, dictionary, tier);
        if candidates.is_empty() {
            continue;
        }
        candidates.shuffle(rng);
        candidates.sort_by(|a, b| {
            score(grid, b, &normalized, &pending).cmp(&score(grid, a, &normalized, &pending))
        });

        let mut committed = false;
        for (start, direction) in candidates {
            let token = grid.snapshot();
            if try_commit(grid, start, direction, &normalized).is_ok() {
                placed.push(PlacedTheme {
                    entry: entry.clone(),
                    start,
                    direction,
                });
                committed = true;
                break;
            }
            grid.rollback(token).expect("token just created");
        }
        if !committed && entry.source != Source::User {
            // A non-user theme word that cannot be placed at all is not by
            // itself fatal; it's simply dropped (spec.md §3: "unplaced
            // ones are discarded").
            continue;
        }
    }

    if !words_only_mode && placed.len() < target.max(2) {
        return Err(PlacementError::ThemePlacementFailed);
    }
    Ok(placed)
}

fn candidate_positions(
    grid: &Grid,
    word: &[char],
    source: Source,
    dictionary: &DictionaryIndex,
    tier: Tier,
) -> Vec<(Coord, Direction)> {
    let len = word.len() as isize;
    let mut out = Vec::new();
    for direction in [Direction::Across, Direction::Down] {
        let (dr, dc) = match direction {
            Direction::Across => (0isize, 1isize),
            Direction::Down => (1isize, 0isize),
        };
        for r in 0..grid.height() {
            for c in 0..grid.width() {
                let end = (r as isize + dr * (len - 1), c as isize + dc * (len - 1));
                if !grid.in_bounds(end.0, end.1) {
                    continue;
                }
                if fits(grid, r, c, dr, dc, word)
                    && crossings_feasible(grid, dictionary, tier, source, r, c, dr, dc, word)
                {
                    out.push((Coord::new(r, c), direction));
                }
            }
        }
    }
    out
}

fn fits(grid: &Grid, row: usize, col: usize, dr: isize, dc: isize, word: &[char]) -> bool {
    for (i, &ch) in word.iter().enumerate() {
        let rr = row as isize + dr * i as isize;
        let cc = col as isize + dc * i as isize;
        let cell = grid.get(rr as usize, cc as usize);
        match cell {
            CellType::EmptyPlayable => {}
            CellType::Letter(existing) if existing == ch => {}
            _ => return false,
        }
    }
    true
}

/// For `source != User`, checks that planting `word` at this position would
/// leave every length->=3 crossing slot with at least one dictionary
/// candidate, given the letters it would fix. `User` entries skip this
/// (spec.md §4.3: "user takes responsibility; infeasibility surfaces in the
/// fill phase").
fn crossings_feasible(
    grid: &Grid,
    dictionary: &DictionaryIndex,
    tier: Tier,
    source: Source,
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    word: &[char],
) -> bool {
    if source == Source::User {
        return true;
    }
    let direction = if dr == 0 {
        Direction::Across
    } else {
        Direction::Down
    };
    let crossing = match direction {
        Direction::Across => Direction::Down,
        Direction::Down => Direction::Across,
    };
    for (i, &ch) in word.iter().enumerate() {
        let rr = (row as isize + dr * i as isize) as usize;
        let cc = (col as isize + dc * i as isize) as usize;
        if !crossing_slot_feasible(grid, dictionary, tier, rr, cc, crossing, ch) {
            return false;
        }
    }
    true
}

fn crossing_slot_feasible(
    grid: &Grid,
    dictionary: &DictionaryIndex,
    tier: Tier,
    row: usize,
    col: usize,
    crossing: Direction,
    ch: char,
) -> bool {
    let run = grid.maximal_run(row, col, crossing);
    if run.len() < 3 {
        return true;
    }
    let letters: Vec<Option<char>> = run
        .iter()
        .map(|cell| {
            if cell.row == row && cell.col == col {
                Some(ch)
            } else {
                match grid.get(cell.row, cell.col) {
                    CellType::Letter(existing) => Some(existing),
                    _ => None,
                }
            }
        })
        .collect();
    let pattern = Pattern::from_letters(&letters);
    !dictionary
        .candidates(&pattern, &HashSet::new(), tier)
        .is_empty()
}

/// Scores a candidate position: primarily by how many pending theme words
/// could plausibly cross it (shared letters at the same grid cell are not
/// yet known since the other words aren't placed, so this approximates
/// "crossing potential" by counting shared letters between this word and
/// each pending word), then by proximity to already-placed letters
/// (closer is better, i.e. it favors interlock), then the RNG has already
/// shuffled the ties. This resolves spec.md §9 Open Question (a).
fn score(
    grid: &Grid,
    candidate: &(Coord, Direction),
    word: &[char],
    pending: &[&ThemeEntry],
) -> (usize, i64) {
    let (start, _direction) = candidate;
    let crossing_potential: usize = pending.iter().map(|entry| shared_letter_count(word, &entry.word)).sum();
    let distance = nearest_letter_distance(grid, *start);
    (crossing_potential, -distance)
}

fn shared_letter_count(a: &[char], b: &str) -> usize {
    let set_a: std::collections::HashSet<char> = a.iter().copied().collect();
    b.chars().filter(|c| set_a.contains(c)).count()
}

fn nearest_letter_distance(grid: &Grid, from: Coord) -> i64 {
    let mut best = i64::MAX;
    for r in 0..grid.height() {
        for c in 0..grid.width() {
            if matches!(grid.get(r, c), CellType::Letter(_)) {
                let d = (r as i64 - from.row as i64).abs() + (c as i64 - from.col as i64).abs();
                if d < best {
                    best = d;
                }
            }
        }
    }
    if best == i64::MAX {
        0
    } else {
        best
    }
}

fn try_commit(
    grid: &mut Grid,
    start: Coord,
    direction: Direction,
    word: &[char],
) -> PlacementResult<()> {
    let (dr, dc) = match direction {
        Direction::Across => (0isize, 1isize),
        Direction::Down => (1isize, 0isize),
    };
    for (i, &ch) in word.iter().enumerate() {
        let rr = (start.row as isize + dr * i as isize) as usize;
        let cc = (start.col as isize + dc * i as isize) as usize;
        grid.place_letter(rr, cc, ch)?;
    }
    let lead = (start.row as isize - dr, start.col as isize - dc);
    if grid.in_bounds(lead.0, lead.1) {
        let (lr, lc) = (lead.0 as usize, lead.1 as usize);
        if grid.get(lr, lc) == CellType::EmptyPlayable {
            grid.place_clue_box(lr, lc)?;
        }
    }
    let trail = (
        start.row as isize + dr * word.len() as isize,
        start.col as isize + dc * word.len() as isize,
    );
    if grid.in_bounds(trail.0, trail.1) {
        let (tr, tc) = (trail.0 as usize, trail.1 as usize);
        if grid.get(tr, tc) == CellType::EmptyPlayable {
            grid.place_clue_box(tr, tc)?;
        }
    }
    Ok(())
}
