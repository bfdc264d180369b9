use std::collections::HashSet;
use std::fmt;

use crate::error::{GridError, GridResult, Invariant};

/// A position in the grid, row-major, zero-indexed. Slots reference cells
/// by coordinate rather than by owning pointer — there are no cycles among
/// cells to worry about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Coord { row, col }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The direction a slot runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    /// The (row, col) step to take moving forward along this direction.
    fn step(&self) -> (isize, isize) {
        match self {
            Direction::Across => (0, 1),
            Direction::Down => (1, 0),
        }
    }

    /// The neighbor offsets that may legally license a run starting cell in
    /// this direction, per invariant I4: across runs look left/above/below,
    /// down runs look above/left/right.
    fn licensing_offsets(&self) -> [(isize, isize); 3] {
        match self {
            Direction::Across => [(0, -1), (-1, 0), (1, 0)],
            Direction::Down => [(-1, 0), (0, -1), (0, 1)],
        }
    }
}

/// The four cell types of the data model (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CellType {
    EmptyPlayable,
    Letter(char),
    ClueBox,
    BlockerZone,
}

impl CellType {
    fn is_fillable(&self) -> bool {
        matches!(self, CellType::EmptyPlayable | CellType::Letter(_))
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            CellType::EmptyPlayable => '.',
            CellType::Letter(l) => *l,
            CellType::ClueBox => '#',
            CellType::BlockerZone => 'x',
        };
        write!(f, "{c}")
    }
}

/// A maximal contiguous run of fillable cells in one direction, registered
/// once the layout is frozen (or, during layout feasibility checks, as a
/// prospective run).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub id: usize,
    pub start: Coord,
    pub direction: Direction,
    pub length: usize,
    pub cells: Vec<Coord>,
}

/// An axis-aligned rectangle used for the blocker zone, given as an origin
/// corner plus height/width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

/// The grid state machine: a 2D cell array, the slot registry once frozen,
/// and a snapshot stack of sparse per-cell diffs supporting cheap
/// copy-on-write rollback for the layout builder's local backtracking.
///
/// Serializable so a sealed grid can round-trip through JSON (property P11);
/// the change log and snapshot marks travel along with it, which is harmless
/// since a reloaded grid that is never rolled back simply carries dead diff
/// history.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<Vec<CellType>>,
    slots: Vec<Slot>,
    change_log: Vec<(Coord, CellType)>,
    snapshot_marks: HashSet<usize>,
}

impl Grid {
    /// Creates a blank grid with the top-left cell pre-planted as a clue
    /// box, per invariant I2's default (no blocker overlaps it yet).
    pub fn new(height: usize, width: usize) -> Self {
        let cells = vec![vec![CellType::EmptyPlayable; width]; height];
        let mut grid = Grid {
            height,
            width,
            cells,
            slots: Vec::new(),
            change_log: Vec::new(),
            snapshot_marks: HashSet::new(),
        };
        grid.place_clue_box(0, 0)
            .expect("a fresh grid always allows a corner clue box");
        grid
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    pub fn get(&self, row: usize, col: usize) -> CellType {
        self.cells[row][col]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    fn record_and_set(&mut self, coord: Coord, new_type: CellType) {
        let previous = self.cells[coord.row][coord.col];
        self.change_log.push((coord, previous));
        self.cells[coord.row][coord.col] = new_type;
    }

    fn neighbors4(&self, coord: Coord) -> Vec<Coord> {
        let (r, c) = (coord.row as isize, coord.col as isize);
        [(r - 1, c), (r + 1, c), (r, c - 1), (r, c + 1)]
            .into_iter()
            .filter(|&(nr, nc)| self.in_bounds(nr, nc))
            .map(|(nr, nc)| Coord::new(nr as usize, nc as usize))
            .collect()
    }

    fn would_break_i1(&self, coord: Coord) -> bool {
        self.neighbors4(coord)
            .into_iter()
            .any(|n| self.cells[n.row][n.col] == CellType::ClueBox)
    }

    /// True when `coord` falls in the bottom-right 2x2 region that
    /// invariant I3 reserves for playable cells.
    fn would_break_i3(&self, coord: Coord) -> bool {
        self.height >= 2
            && self.width >= 2
            && coord.row >= self.height - 2
            && coord.col >= self.width - 2
    }

    /// Plants a clue box at `(row, col)`, failing if it is not currently
    /// `EMPTY_PLAYABLE`, if doing so would place two clue boxes
    /// orthogonally adjacent (I1), or if it falls in the bottom-right 2x2
    /// region reserved by I3.
    pub fn place_clue_box(&mut self, row: usize, col: usize) -> GridResult<()> {
        let coord = Coord::new(row, col);
        if self.cells[row][col] != CellType::EmptyPlayable {
            return Err(GridError::CellNotEmpty(coord));
        }
        if self.would_break_i1(coord) {
            return Err(GridError::WouldBreakI1(coord));
        }
        if self.would_break_i3(coord) {
            return Err(GridError::WouldBreakI3(coord));
        }
        self.record_and_set(coord, CellType::ClueBox);
        Ok(())
    }

    /// Places a letter, succeeding idempotently if the cell already holds
    /// the same letter.
    pub fn place_letter(&mut self, row: usize, col: usize, ch: char) -> GridResult<()> {
        let coord = Coord::new(row, col);
        match self.cells[row][col] {
            CellType::EmptyPlayable => {
                self.record_and_set(coord, CellType::Letter(ch));
                Ok(())
            }
            CellType::Letter(existing) if existing == ch => Ok(()),
            CellType::Letter(existing) => Err(GridError::LetterConflict(coord, existing, ch)),
            _ => Err(GridError::CellNotEmpty(coord)),
        }
    }

    /// Marks every cell of `rect` as `BLOCKER_ZONE`, then applies invariant
    /// I2's corner auto-planting. A blocker at the top-left corner forces
    /// clue boxes at `(0, rect.width)` and `(rect.height, 0)` wherever those
    /// fall inside the grid; if neither does, the configuration is
    /// rejected (spec.md §9, open question (b)).
    pub fn set_blocker(&mut self, rect: Rect) -> Result<(), crate::error::PlacementError> {
        use crate::error::PlacementError;
        if rect.row + rect.height > self.height || rect.col + rect.width > self.width {
            return Err(PlacementError::BlockerOutOfBounds {
                w: rect.width,
                h: rect.height,
                r: rect.row,
                c: rect.col,
                height: self.height,
                width: self.width,
            });
        }
        for r in rect.row..rect.row + rect.height {
            for c in rect.col..rect.col + rect.width {
                self.record_and_set(Coord::new(r, c), CellType::BlockerZone);
            }
        }
        if rect.row == 0 && rect.col == 0 {
            let mut candidates = Vec::new();
            if rect.width < self.width {
                candidates.push((0usize, rect.width));
            }
            if rect.height < self.height {
                candidates.push((rect.height, 0usize));
            }
            if candidates.is_empty() {
                return Err(PlacementError::BlockerSwallowsCorner);
            }
            for (r, c) in candidates {
                if self.cells[r][c] == CellType::EmptyPlayable {
                    self.place_clue_box(r, c)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the coordinates of the maximal run of fillable cells
    /// (EMPTY_PLAYABLE or LETTER) containing `(row, col)` in `direction`.
    pub fn maximal_run(&self, row: usize, col: usize, direction: Direction) -> Vec<Coord> {
        let (dr, dc) = direction.step();
        if !self.cells[row][col].is_fillable() {
            return Vec::new();
        }
        let mut begin = Coord::new(row, col);
        loop {
            let prev = (begin.row as isize - dr, begin.col as isize - dc);
            if !self.in_bounds(prev.0, prev.1) {
                break;
            }
            let prev_coord = Coord::new(prev.0 as usize, prev.1 as usize);
            if !self.cells[prev_coord.row][prev_coord.col].is_fillable() {
                break;
            }
            begin = prev_coord;
        }
        let mut run = Vec::new();
        let mut cur = begin;
        loop {
            run.push(cur);
            let next = (cur.row as isize + dr, cur.col as isize + dc);
            if !self.in_bounds(next.0, next.1) {
                break;
            }
            let next_coord = Coord::new(next.0 as usize, next.1 as usize);
            if !self.cells[next_coord.row][next_coord.col].is_fillable() {
                break;
            }
            cur = next_coord;
        }
        run
    }

    /// Pushes a snapshot marker and returns a token identifying it.
    pub fn snapshot(&mut self) -> usize {
        let token = self.change_log.len();
        self.snapshot_marks.insert(token);
        token
    }

    /// Restores every cell mutated since `token`'s snapshot, in reverse
    /// order so interleaved writes to the same cell unwind correctly.
    pub fn rollback(&mut self, token: usize) -> GridResult<()> {
        if token > self.change_log.len() || !self.snapshot_marks.contains(&token) {
            return Err(GridError::UnknownSnapshot(token));
        }
        while self.change_log.len() > token {
            let (coord, previous) = self.change_log.pop().unwrap();
            self.cells[coord.row][coord.col] = previous;
        }
        self.snapshot_marks.retain(|&t| t <= token);
        self.snapshot_marks.remove(&token);
        Ok(())
    }

    /// Scans the grid and (re)builds the slot registry from scratch,
    /// emitting every maximal fillable run of length >= 2 in both
    /// directions. Returns the freshly registered slots.
    pub fn register_slots(&mut self) -> &[Slot] {
        let mut slots = Vec::new();
        let mut next_id = 0usize;
        for direction in [Direction::Across, Direction::Down] {
            for run in self.runs_of(direction) {
                if run.len() >= 2 {
                    slots.push(Slot {
                        id: next_id,
                        start: run[0],
                        direction,
                        length: run.len(),
                        cells: run,
                    });
                    next_id += 1;
                }
            }
        }
        self.slots = slots;
        &self.slots
    }

    fn all_clue_coords(&self) -> Vec<Coord> {
        let mut out = Vec::new();
        for r in 0..self.height {
            for c in 0..self.width {
                if self.cells[r][c] == CellType::ClueBox {
                    out.push(Coord::new(r, c));
                }
            }
        }
        out
    }

    fn licensing_clue_for_run_start(&self, start: Coord, direction: Direction) -> Option<Coord> {
        for (dr, dc) in direction.licensing_offsets() {
            let (nr, nc) = (start.row as isize + dr, start.col as isize + dc);
            if self.in_bounds(nr, nc) && self.cells[nr as usize][nc as usize] == CellType::ClueBox
            {
                return Some(Coord::new(nr as usize, nc as usize));
            }
        }
        None
    }

    /// Checks I1, I3, I4 and I5 against the current cell-type grid.
    /// Dictionary validity (I6) and cross-slot uniqueness (I7) are not
    /// structural and are checked by the orchestrator's seal step instead.
    pub fn validate_structure(&self) -> GridResult<()> {
        for r in 0..self.height {
            for c in 0..self.width {
                if self.cells[r][c] == CellType::ClueBox {
                    let coord = Coord::new(r, c);
                    if self.would_break_i1(coord) {
                        return Err(GridError::InvariantViolation(
                            Invariant::I1NoAdjacentClues,
                            coord,
                            "two clue boxes are orthogonally adjacent".into(),
                        ));
                    }
                }
            }
        }
        if self.height >= 2 && self.width >= 2 {
            for r in self.height - 2..self.height {
                for c in self.width - 2..self.width {
                    if self.cells[r][c] == CellType::ClueBox {
                        return Err(GridError::InvariantViolation(
                            Invariant::I3BottomRightFree,
                            Coord::new(r, c),
                            "bottom-right 2x2 region contains a clue box".into(),
                        ));
                    }
                }
            }
        }
        let mut licensed_clues: HashSet<Coord> = HashSet::new();
        for direction in [Direction::Across, Direction::Down] {
            for run in self.runs_of(direction) {
                if run.len() < 2 {
                    continue;
                }
                let start = run[0];
                match self.licensing_clue_for_run_start(start, direction) {
                    Some(clue) => {
                        licensed_clues.insert(clue);
                    }
                    None => {
                        return Err(GridError::InvariantViolation(
                            Invariant::I4Licensing,
                            start,
                            format!("{direction:?} run has no direction-legal adjacent clue box"),
                        ));
                    }
                }
            }
        }
        for clue in self.all_clue_coords() {
            if !licensed_clues.contains(&clue) {
                return Err(GridError::InvariantViolation(
                    Invariant::I5ClueLicensesSlot,
                    clue,
                    "clue box licenses no slot of length >= 2".into(),
                ));
            }
        }
        Ok(())
    }

    /// All maximal fillable runs in the given direction, in scan order.
    pub fn runs_of(&self, direction: Direction) -> Vec<Vec<Coord>> {
        let mut runs = Vec::new();
        let (outer, inner) = match direction {
            Direction::Across => (self.height, self.width),
            Direction::Down => (self.width, self.height),
        };
        for o in 0..outer {
            let mut i = 0;
            while i < inner {
                let (row, col) = match direction {
                    Direction::Across => (o, i),
                    Direction::Down => (i, o),
                };
                if !self.cells[row][col].is_fillable() {
                    i += 1;
                    continue;
                }
                let (pr, pc) = match direction {
                    Direction::Across => (row as isize, col as isize - 1),
                    Direction::Down => (row as isize - 1, col as isize),
                };
                let is_start =
                    !self.in_bounds(pr, pc) || !self.cells[pr as usize][pc as usize].is_fillable();
                if is_start {
                    runs.push(self.maximal_run(row, col, direction));
                }
                i += 1;
            }
        }
        runs
    }

    /// True when the cell at `(row, col)` has both its across and down
    /// maximal runs of length 1 — an orphan the layout builder must heal.
    pub fn is_orphan(&self, row: usize, col: usize) -> bool {
        self.cells[row][col] == CellType::EmptyPlayable
            && self.maximal_run(row, col, Direction::Across).len() == 1
            && self.maximal_run(row, col, Direction::Down).len() == 1
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.cells {
            for cell in row {
                write!(f, "{cell} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_grid_has_corner_clue_and_no_other_cells_set() {
        let grid = Grid::new(5, 5);
        assert_eq!(grid.get(0, 0), CellType::ClueBox);
        assert_eq!(grid.get(0, 1), CellType::EmptyPlayable);
        assert_eq!(grid.get(4, 4), CellType::EmptyPlayable);
    }

    #[test]
    fn place_clue_box_rejects_adjacent_clues() {
        let mut grid = Grid::new(5, 5);
        assert!(grid.place_clue_box(0, 1).is_err());
        assert!(grid.place_clue_box(1, 0).is_err());
        assert!(grid.place_clue_box(2, 2).is_ok());
        assert!(grid.place_clue_box(2, 3).is_err());
        assert!(grid.place_clue_box(3, 2).is_err());
    }

    #[test]
    fn place_letter_is_idempotent_and_detects_conflicts() {
        let mut grid = Grid::new(3, 3);
        grid.place_letter(1, 1, 'A').unwrap();
        assert!(grid.place_letter(1, 1, 'A').is_ok());
        assert!(grid.place_letter(1, 1, 'B').is_err());
    }

    #[test]
    fn snapshot_rollback_restores_exact_state() {
        let mut grid = Grid::new(5, 5);
        let token = grid.snapshot();
        grid.place_clue_box(2, 2).unwrap();
        grid.place_letter(3, 3, 'Z').unwrap();
        assert_eq!(grid.get(2, 2), CellType::ClueBox);
        grid.rollback(token).unwrap();
        assert_eq!(grid.get(2, 2), CellType::EmptyPlayable);
        assert_eq!(grid.get(3, 3), CellType::EmptyPlayable);
    }

    #[test]
    fn maximal_run_stops_at_clue_boxes_and_edges() {
        let mut grid = Grid::new(1, 5);
        let run = grid.maximal_run(0, 2, Direction::Across);
        assert_eq!(
            run,
            vec![
                Coord::new(0, 1),
                Coord::new(0, 2),
                Coord::new(0, 3),
                Coord::new(0, 4)
            ]
        );
        grid.place_clue_box(0, 3).unwrap();
        let run = grid.maximal_run(0, 1, Direction::Across);
        assert_eq!(run, vec![Coord::new(0, 1), Coord::new(0, 2)]);
    }

    #[test]
    fn register_slots_only_counts_runs_of_length_two_or_more() {
        let mut grid = Grid::new(1, 5);
        grid.place_clue_box(0, 2).unwrap();
        let slots = grid.register_slots();
        // (0,0) is a clue so the run at col 1 is length 1 -> not a slot;
        // cols 3..5 form a length-2 run.
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].length, 2);
    }

    #[test]
    fn set_blocker_top_left_plants_both_corner_clues_when_in_bounds() {
        let mut grid = Grid::new(10, 10);
        grid.set_blocker(Rect {
            row: 0,
            col: 0,
            height: 3,
            width: 3,
        })
        .unwrap();
        assert_eq!(grid.get(0, 3), CellType::ClueBox);
        assert_eq!(grid.get(3, 0), CellType::ClueBox);
    }

    #[test]
    fn set_blocker_falls_back_to_remaining_corner_when_one_is_out_of_range() {
        // height=20, width=10, blocker h=5,w=10 at (0,0): (0,10) is out of
        // range, so only (5,0) gets planted (scenario S4).
        let mut grid = Grid::new(20, 10);
        grid.set_blocker(Rect {
            row: 0,
            col: 0,
            height: 5,
            width: 10,
        })
        .unwrap();
        assert_eq!(grid.get(5, 0), CellType::ClueBox);
        for r in 0..5 {
            for c in 0..10 {
                assert_eq!(grid.get(r, c), CellType::BlockerZone);
            }
        }
    }

    #[test]
    fn set_blocker_out_of_bounds_is_rejected() {
        let mut grid = Grid::new(5, 5);
        let err = grid.set_blocker(Rect {
            row: 3,
            col: 3,
            height: 4,
            width: 4,
        });
        assert!(err.is_err());
    }

    #[test]
    fn place_clue_box_rejects_bottom_right_2x2_region() {
        let mut grid = Grid::new(4, 4);
        assert!(grid.place_clue_box(3, 3).is_err());
        assert!(grid.place_clue_box(2, 3).is_err());
        assert!(grid.place_clue_box(3, 2).is_err());
        assert!(grid.place_clue_box(1, 1).is_ok());
    }

    #[test]
    fn orphan_detection_requires_both_directions_length_one() {
        let mut grid = Grid::new(3, 3);
        grid.place_clue_box(0, 2).unwrap();
        grid.place_clue_box(2, 0).unwrap();
        // (0,1) across-run is length 1 ((0,2) is a clue) but down-run at
        // (0,1) spans the whole column, so it is not an orphan.
        assert!(!grid.is_orphan(0, 1));
    }
}
