use thiserror::Error;

use crate::grid::Coord;

/// Invariant identifiers from the data model (I1..I8), used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    I1NoAdjacentClues,
    I2CornerClue,
    I3BottomRightFree,
    I4Licensing,
    I5ClueLicensesSlot,
    I6DictionaryWord,
    I7Uniqueness,
    I8RunLength,
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Invariant::I1NoAdjacentClues => "I1",
            Invariant::I2CornerClue => "I2",
            Invariant::I3BottomRightFree => "I3",
            Invariant::I4Licensing => "I4",
            Invariant::I5ClueLicensesSlot => "I5",
            Invariant::I6DictionaryWord => "I6",
            Invariant::I7Uniqueness => "I7",
            Invariant::I8RunLength => "I8",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("cell {0:?} is not EMPTY_PLAYABLE and cannot host a clue box")]
    CellNotEmpty(Coord),
    #[error("placing a clue box at {0:?} would violate invariant I1")]
    WouldBreakI1(Coord),
    #[error("placing a clue box at {0:?} would violate invariant I3")]
    WouldBreakI3(Coord),
    #[error("cell {0:?} already holds letter '{1}', cannot overwrite with '{2}'")]
    LetterConflict(Coord, char, char),
    #[error("invariant {0} violated at {1:?}: {2}")]
    InvariantViolation(Invariant, Coord, String),
    #[error("snapshot token {0} is unknown or already rolled back")]
    UnknownSnapshot(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("blocker rectangle {w}x{h} at ({r},{c}) does not fit in a {height}x{width} grid")]
    BlockerOutOfBounds {
        w: usize,
        h: usize,
        r: usize,
        c: usize,
        height: usize,
        width: usize,
    },
    #[error("blocker covers the top-left corner needed by invariant I2 with no legal corner cell remaining")]
    BlockerSwallowsCorner,
    #[error("exhausted candidate positions while placing theme words")]
    ThemePlacementFailed,
    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("orphan healing at {0:?} could not be resolved without breaking I1")]
    OrphanUnresolvable(Coord),
    #[error("slot starting at {0:?} has no legal licensing position")]
    LicensingImpossible(Coord),
    #[error("slot starting at {0:?} of length {1} has zero dictionary candidates")]
    SlotInfeasible(Coord, usize),
    #[error(transparent)]
    Grid(#[from] GridError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("no assignment satisfies all slot and uniqueness constraints")]
    Unsat,
    #[error("solver exceeded its wall-clock budget")]
    Timeout,
}

/// The error kinds surfaced to callers per the component's failure-mode
/// table. Recoverable kinds (commented per variant) are retried by the
/// orchestrator; the rest are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("blocker out of bounds: {0}")]
    BlockerOutOfBounds(#[from] PlacementErrorFatal),
    #[error("theme placement failed")]
    ThemePlacementFailed, // recovered — retry attempt
    #[error("layout infeasible: {0}")]
    LayoutInfeasible(String), // recovered — retry attempt
    #[error("fill unsatisfiable")]
    FillUnsat, // recovered — retry attempt
    #[error("fill timed out")]
    FillTimeout, // recovered — retry attempt
    #[error("invariant violation: {0}")]
    InvariantViolation(String), // fatal — indicates a bug
    #[error("generation failed after {attempts} attempt(s); last kind: {last_kind}")]
    GenerationFailed {
        attempts: usize,
        last_kind: String,
        trace: Vec<AttemptOutcome>,
    },
}

/// Wrapper so `BLOCKER_OUT_OF_BOUNDS`/`INVALID_CONFIG`-style fatal errors
/// can still carry a `PlacementError` payload without implying they're
/// recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct PlacementErrorFatal(pub PlacementError);

/// One entry in the orchestrator's attempt trace (spec.md §7: "a single
/// error with the terminal kind plus an attempt trace").
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub attempt: usize,
    pub kind: String,
}

pub type GridResult<T> = Result<T, GridError>;
pub type PlacementResult<T> = Result<T, PlacementError>;
pub type LayoutResult<T> = Result<T, LayoutError>;
pub type SolverResult<T> = Result<T, SolverError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
