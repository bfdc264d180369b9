//! Generator for dense, barred (block-free corner) crossword puzzles:
//! a layout builder that carves a grid into clue boxes and playable runs,
//! followed by a constraint-propagation fill solver that assigns dictionary
//! words to the resulting slots.

pub mod dictionary;
pub mod error;
pub mod grid;
pub mod layout;
pub mod orchestrator;
pub mod solver;
pub mod theme;

pub use dictionary::{DictionaryEntry, DictionaryIndex, Tier};
pub use error::GenerationError;
pub use grid::{CellType, Coord, Direction, Grid};
pub use orchestrator::{
    generate, ClueEmitter, DifficultyHistogram, GeneratorConfig, Puzzle, SlotMeta, SlotRecord,
    ThemeCoverage, ValidationSummary,
};
pub use theme::{BlockerSpec, Source, ThemeEntry};
