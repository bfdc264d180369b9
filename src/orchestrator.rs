use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dictionary::{DictionaryIndex, Tier};
use crate::error::{AttemptOutcome, GenerationError, GenerationResult, PlacementErrorFatal};
use crate::grid::{CellType, Coord, Direction, Grid};
use crate::layout::build_layout;
use crate::solver::{cp_fill, SolverConfig};
use crate::theme::{apply_blocker, place_theme_words, BlockerSpec, PlacedTheme, Source, ThemeEntry};

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

const EASY_PHASE1_RETRIES: usize = 3;

/// Top-level configuration for one generation request (spec.md §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GeneratorConfig {
    pub height: usize,
    pub width: usize,
    pub difficulty: Tier,
    pub language: String,
    pub seed: u64,
    /// Minimum fraction of cells that must end up as LETTER cells for a
    /// sealed puzzle to be accepted; below this the attempt is treated as
    /// too sparse and retried (spec.md §6 "completion target").
    pub completion_target: f64,
    pub blocker_spec: Option<BlockerSpec>,
    pub theme_entries: Vec<ThemeEntry>,
    pub max_attempts: usize,
    pub solver_timeout_ms: u64,
    pub solver_workers: usize,
    pub allow_phase2: bool,
}

/// Slot metadata handed to a [`ClueEmitter`]; the core attaches whatever
/// text comes back without inspecting it (spec.md §6).
#[derive(Debug, Clone)]
pub struct SlotMeta {
    pub id: usize,
    pub start: Coord,
    pub direction: Direction,
    pub length: usize,
    pub word: String,
    pub source: Source,
}

/// External capability: given a filled slot's metadata, optionally returns
/// clue text for it. Invoked once per slot in `seal()` (spec.md §6).
pub type ClueEmitter<'a> = dyn Fn(&SlotMeta) -> Option<String> + 'a;

/// One row of the output slot table (spec.md §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SlotRecord {
    pub id: usize,
    pub start: Coord,
    pub direction: Direction,
    pub length: usize,
    pub word: String,
    pub source: Source,
    pub clue: Option<String>,
}

/// How many of the configured theme entries actually made it onto the grid.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ThemeCoverage {
    pub requested: usize,
    pub placed: usize,
}

/// Difficulty-tier counts over fill slots of length->=3 (theme slots are
/// reported separately via `Puzzle::theme_coverage`, not here; spec.md §6).
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct DifficultyHistogram {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

/// Invariants `seal()` actually checked for this puzzle, by name.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ValidationSummary {
    pub checked: Vec<String>,
}

/// A fully generated and sealed puzzle.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Puzzle {
    pub grid: Grid,
    pub theme: Vec<PlacedTheme>,
    pub attempts: usize,
    pub slots: Vec<SlotRecord>,
    pub theme_coverage: ThemeCoverage,
    pub difficulty_histogram: DifficultyHistogram,
    pub validation_summary: ValidationSummary,
}

/// Runs the full layout-then-fill pipeline, retrying from scratch on any
/// recoverable failure up to `config.max_attempts` times, per spec.md §4.6.
/// `clue_emitter`, if given, is applied once per filled slot in `seal()`.
pub fn generate(
    config: &GeneratorConfig,
    dictionary: &DictionaryIndex,
    clue_emitter: Option<&ClueEmitter>,
) -> GenerationResult<Puzzle> {
    if config.height == 0 || config.width == 0 {
        return Err(GenerationError::InvalidConfig(
            "height and width must be positive".into(),
        ));
    }
    if config.height <= 2 && config.width <= 2 {
        // I2 forces a clue box at (0,0); I3 reserves the bottom-right 2x2.
        // When both dimensions are this small the two regions overlap and
        // no grid can satisfy both.
        return Err(GenerationError::InvalidConfig(
            "grid is too small to satisfy both the corner-clue and bottom-right invariants".into(),
        ));
    }
    if config.max_attempts == 0 {
        return Err(GenerationError::InvalidConfig(
            "max_attempts must be at least 1".into(),
        ));
    }

    let mut trace: Vec<AttemptOutcome> = Vec::new();

    for attempt in 1..=config.max_attempts {
        let mut rng = ChaCha8Rng::seed_from_u64(attempt_seed(config.seed, attempt));
        let mut grid = Grid::new(config.height, config.width);

        if let Err(e) = apply_blocker(&mut grid, config.blocker_spec, &mut rng) {
            return Err(GenerationError::BlockerOutOfBounds(PlacementErrorFatal(e)));
        }

        let words_only_mode = config
            .theme_entries
            .iter()
            .all(|e| e.source == Source::User);
        let placed = match place_theme_words(
            &mut grid,
            &config.theme_entries,
            words_only_mode,
            config.difficulty,
            dictionary,
            &mut rng,
        ) {
            Ok(p) => p,
            Err(_) => {
                trace.push(AttemptOutcome {
                    attempt,
                    kind: "ThemePlacementFailed".into(),
                });
                continue;
            }
        };

        if let Err(e) = build_layout(&mut grid, dictionary, config.difficulty) {
            trace.push(AttemptOutcome {
                attempt,
                kind: format!("LayoutInfeasible({e})"),
            });
            continue;
        }

        match fill_with_escalation(&grid, dictionary, config, attempt) {
            Ok(filled) => {
                grid = filled;
            }
            Err(kind) => {
                trace.push(AttemptOutcome { attempt, kind });
                continue;
            }
        }

        match seal(&grid, dictionary, config, &placed, clue_emitter) {
            Ok((slots, theme_coverage, difficulty_histogram, validation_summary)) => {
                return Ok(Puzzle {
                    grid,
                    theme: placed,
                    attempts: attempt,
                    slots,
                    theme_coverage,
                    difficulty_histogram,
                    validation_summary,
                });
            }
            Err(GenerationError::LayoutInfeasible(msg)) => {
                // too sparse to meet completion_target — recoverable, retry
                trace.push(AttemptOutcome {
                    attempt,
                    kind: format!("LayoutInfeasible({msg})"),
                });
                continue;
            }
            Err(other) => return Err(other),
        }
    }

    let last_kind = trace
        .last()
        .map(|a| a.kind.clone())
        .unwrap_or_else(|| "unknown".into());
    Err(GenerationError::GenerationFailed {
        attempts: config.max_attempts,
        last_kind,
        trace,
    })
}

fn attempt_seed(seed: u64, attempt: usize) -> u64 {
    seed.wrapping_add((attempt as u64).wrapping_mul(0x2545_F491_4F6C_DD1D))
}

/// Runs the CP fill solver for one attempt, applying EASY-mode's
/// two-phase escalation (spec.md §4.5): phase 1 enforces a strict
/// difficulty cutoff with no relaxation budget, retried up to
/// `EASY_PHASE1_RETRIES` times; if every retry is UNSAT and phase 2 is
/// allowed, one more run grants a small relaxation budget. Medium and Hard
/// difficulties run a single unescalated attempt.
fn fill_with_escalation(
    grid: &Grid,
    dictionary: &DictionaryIndex,
    config: &GeneratorConfig,
    attempt: usize,
) -> Result<Grid, String> {
    let deadline = Instant::now() + Duration::from_millis(config.solver_timeout_ms);
    let slot_count = grid.clone().register_slots().len();

    if config.difficulty == Tier::Easy {
        let phase1 = SolverConfig {
            tier: Tier::Easy,
            max_difficulty_score: Some(0.30),
            medium_slot_limit: 0,
            banned: HashSet::new(),
            deadline,
            workers: config.solver_workers,
            seed: config.seed,
            attempt,
        };
        let mut last_err = None;
        for retry in 0..EASY_PHASE1_RETRIES {
            let mut working = grid.clone();
            let mut this_phase = phase1.clone();
            this_phase.attempt = attempt * 100 + retry;
            match cp_fill(&mut working, dictionary, &this_phase) {
                Ok(()) => return Ok(working),
                Err(e) => last_err = Some(e),
            }
        }
        if config.allow_phase2 {
            let phase2 = SolverConfig {
                tier: Tier::Easy,
                max_difficulty_score: Some(0.30),
                medium_slot_limit: (slot_count / 10).max(2),
                banned: HashSet::new(),
                deadline: Instant::now() + Duration::from_millis(config.solver_timeout_ms),
                workers: config.solver_workers,
                seed: config.seed,
                attempt: attempt * 100 + EASY_PHASE1_RETRIES,
            };
            let mut working = grid.clone();
            return cp_fill(&mut working, dictionary, &phase2)
                .map(|()| working)
                .map_err(|e| fill_error_kind(e));
        }
        return Err(fill_error_kind(last_err.unwrap_or(crate::error::SolverError::Unsat)));
    }

    let single = SolverConfig {
        tier: config.difficulty,
        max_difficulty_score: None,
        medium_slot_limit: 0,
        banned: HashSet::new(),
        deadline,
        workers: config.solver_workers,
        seed: config.seed,
        attempt,
    };
    let mut working = grid.clone();
    cp_fill(&mut working, dictionary, &single)
        .map(|()| working)
        .map_err(fill_error_kind)
}

fn fill_error_kind(e: crate::error::SolverError) -> String {
    match e {
        crate::error::SolverError::Unsat => "FillUnsat".into(),
        crate::error::SolverError::Timeout => "FillTimeout".into(),
    }
}

/// Final acceptance check: structural invariants (I1, I3, I4, I5) plus the
/// non-structural ones the grid can't check on its own — every length->=3
/// slot's word is a real dictionary entry (I6, exempting `User`-sourced
/// theme slots per scenario S5) and no word repeats anywhere on the grid
/// (I7, which does apply to `User` theme words) — and the configured
/// completion target. On success, builds the slot table, theme coverage
/// stats, difficulty histogram, and validation summary that make up the
/// rest of the output contract (spec.md §6).
fn seal(
    grid: &Grid,
    dictionary: &DictionaryIndex,
    config: &GeneratorConfig,
    placed: &[PlacedTheme],
    clue_emitter: Option<&ClueEmitter>,
) -> GenerationResult<(Vec<SlotRecord>, ThemeCoverage, DifficultyHistogram, ValidationSummary)> {
    grid.validate_structure()
        .map_err(|e| GenerationError::InvariantViolation(e.to_string()))?;

    let theme_sources: HashMap<(Coord, Direction), Source> = placed
        .iter()
        .map(|p| ((p.start, p.direction), p.entry.source))
        .collect();

    let slots = grid.clone().register_slots().to_vec();
    let mut seen_words = HashSet::new();
    let mut records = Vec::with_capacity(slots.len());
    let mut histogram = DifficultyHistogram::default();

    for (id, slot) in slots.iter().enumerate() {
        let word: String = slot
            .cells
            .iter()
            .map(|c| match grid.get(c.row, c.col) {
                CellType::Letter(ch) => ch,
                _ => ' ',
            })
            .collect();
        if word.contains(' ') {
            return Err(GenerationError::InvariantViolation(format!(
                "slot at {:?} has an unfilled cell after solving",
                slot.start
            )));
        }

        let theme_source = theme_sources.get(&(slot.start, slot.direction)).copied();
        let is_user_theme = matches!(theme_source, Some(Source::User));

        if slot.length >= 3 && !is_user_theme && !dictionary.contains(&word) {
            return Err(GenerationError::InvariantViolation(format!(
                "slot at {:?} holds '{word}', which is not in the dictionary",
                slot.start
            )));
        }
        if !seen_words.insert(word.clone()) {
            return Err(GenerationError::InvariantViolation(format!(
                "word '{word}' is used by more than one slot"
            )));
        }

        if theme_source.is_none() && slot.length >= 3 {
            if let Some(entry) = dictionary.lookup_by_surface(&word) {
                match classify_difficulty(entry.difficulty_score) {
                    Tier::Easy => histogram.easy += 1,
                    Tier::Medium => histogram.medium += 1,
                    Tier::Hard => histogram.hard += 1,
                }
            }
        }

        let source = theme_source.unwrap_or(Source::Fill);
        let meta = SlotMeta {
            id,
            start: slot.start,
            direction: slot.direction,
            length: slot.length,
            word: word.clone(),
            source,
        };
        let clue = clue_emitter.and_then(|emit| emit(&meta));
        records.push(SlotRecord {
            id,
            start: slot.start,
            direction: slot.direction,
            length: slot.length,
            word,
            source,
            clue,
        });
    }

    let total_cells = grid.height() * grid.width();
    let letter_cells = (0..grid.height())
        .flat_map(|r| (0..grid.width()).map(move |c| (r, c)))
        .filter(|&(r, c)| matches!(grid.get(r, c), CellType::Letter(_)))
        .count();
    if total_cells > 0 && (letter_cells as f64 / total_cells as f64) < config.completion_target {
        return Err(GenerationError::LayoutInfeasible(format!(
            "only {letter_cells}/{total_cells} cells filled, below completion_target {}",
            config.completion_target
        )));
    }

    let theme_coverage = ThemeCoverage {
        requested: config.theme_entries.len(),
        placed: placed.len(),
    };
    let validation_summary = ValidationSummary {
        checked: vec![
            "I1".into(),
            "I3".into(),
            "I4".into(),
            "I5".into(),
            "I6".into(),
            "I7".into(),
            "completion_target".into(),
        ],
    };

    Ok((records, theme_coverage, histogram, validation_summary))
}

/// Buckets a dictionary entry's difficulty score into the nearest tier
/// center (spec.md §4.1's 0.15/0.45/0.80), for the output histogram.
fn classify_difficulty(score: f64) -> Tier {
    const CENTERS: [(Tier, f64); 3] = [(Tier::Easy, 0.15), (Tier::Medium, 0.45), (Tier::Hard, 0.80)];
    CENTERS
        .iter()
        .min_by(|a, b| (a.1 - score).abs().partial_cmp(&(b.1 - score).abs()).unwrap())
        .unwrap()
        .0
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
                frequency: 0.6,
                difficulty_score: 0.2,
                is_compound: false,
                is_stopword: false,
            });
        }
        idx
    }

    fn base_config() -> GeneratorConfig {
        GeneratorConfig {
            height: 4,
            width: 4,
            difficulty: Tier::Medium,
            language: "ro".into(),
            seed: 123,
            completion_target: 0.0,
            blocker_spec: None,
            theme_entries: Vec::new(),
            max_attempts: 3,
            solver_timeout_ms: 2000,
            solver_workers: 1,
            allow_phase2: true,
        }
    }

    /// Every string of the given lengths over `alphabet`, inserted with a
    /// uniform `difficulty_score`/`frequency`. Used to build grids rich
    /// enough that layout and fill are virtually certain to succeed,
    /// letting scenario tests assert the named property rather than mere
    /// success/failure.
    fn exhaustive_dict(lengths: &[usize], alphabet: &[char], difficulty_score: f64) -> DictionaryIndex {
        let mut idx = DictionaryIndex::new();
        for &len in lengths {
            for word in all_words(len, alphabet) {
                idx.insert(DictionaryEntry {
                    surface: word,
                    length: len,
                    frequency: 0.5,
                    difficulty_score,
                    is_compound: false,
                    is_stopword: false,
                });
            }
        }
        idx
    }

    fn all_words(length: usize, alphabet: &[char]) -> Vec<String> {
        if length == 0 {
            return vec![String::new()];
        }
        let mut out = Vec::new();
        for rest in all_words(length - 1, alphabet) {
            for &c in alphabet {
                out.push(format!("{c}{rest}"));
            }
        }
        out
    }

    #[test]
    fn rejects_zero_sized_grid() {
        let mut config = base_config();
        config.height = 0;
        let dictionary = dict_with(&["CAT"]);
        let err = generate(&config, &dictionary, None);
        assert!(matches!(err, Err(GenerationError::InvalidConfig(_))));
    }

    #[test]
    fn generation_is_deterministic_for_a_fixed_seed() {
        let dictionary = dict_with(&[
            "CASA", "CARTE", "ARTA", "SAT", "ATE", "ASE", "CA", "AS", "AR", "TE", "SA",
        ]);
        let config = base_config();
        let r1 = generate(&config, &dictionary, None);
        let r2 = generate(&config, &dictionary, None);
        match (r1, r2) {
            (Ok(p1), Ok(p2)) => assert_eq!(format!("{}", p1.grid), format!("{}", p2.grid)),
            (Err(_), Err(_)) => {}
            _ => panic!("generation outcome differed across identical runs"),
        }
    }

    // Scenario S1: a themeless grid fills completely with unique, real
    // dictionary words.
    #[test]
    fn s1_fill_only_grid_has_unique_real_words() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.5);
        let config = base_config();
        let puzzle = generate(&config, &dictionary, None)
            .expect("an exhaustive dictionary should always allow a small grid to fill");

        let mut seen = HashSet::new();
        for record in &puzzle.slots {
            assert!(seen.insert(record.word.clone()), "word '{}' repeats", record.word);
            if record.length >= 3 {
                assert!(
                    dictionary.contains(&record.word),
                    "'{}' is not a real dictionary word",
                    record.word
                );
            }
        }
    }

    // Scenario S2: at EASY difficulty, the vast majority of fill slots stay
    // below the 0.30 difficulty cutoff.
    #[test]
    fn s2_easy_difficulty_mostly_stays_below_cutoff() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.10);
        let mut config = base_config();
        config.difficulty = Tier::Easy;
        let puzzle = generate(&config, &dictionary, None)
            .expect("an exhaustive, uniformly-easy dictionary should fill at EASY difficulty");

        let fill_slots: Vec<&SlotRecord> = puzzle
            .slots
            .iter()
            .filter(|s| s.length >= 3 && s.source == Source::Fill)
            .collect();
        assert!(!fill_slots.is_empty());
        let below_cutoff = fill_slots
            .iter()
            .filter(|s| {
                dictionary
                    .lookup_by_surface(&s.word)
                    .is_some_and(|e| e.difficulty_score < 0.30)
            })
            .count();
        let ratio = below_cutoff as f64 / fill_slots.len() as f64;
        assert!(ratio >= 0.90, "only {ratio} of fill slots were below the EASY cutoff");
    }

    // Property: without phase-2 escalation, EASY-tier fill never exceeds
    // the strict difficulty cutoff at all (the phase-1 floor).
    #[test]
    fn easy_phase1_without_escalation_never_exceeds_cutoff() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.10);
        let mut config = base_config();
        config.difficulty = Tier::Easy;
        config.allow_phase2 = false;
        let puzzle = generate(&config, &dictionary, None)
            .expect("phase 1 alone should already succeed against a uniformly-easy dictionary");

        for record in puzzle.slots.iter().filter(|s| s.length >= 3 && s.source == Source::Fill) {
            let entry = dictionary
                .lookup_by_surface(&record.word)
                .expect("fill word must be a real dictionary entry");
            assert!(entry.difficulty_score < 0.30);
        }
    }

    // Scenario S5: a user-supplied theme word absent from the dictionary
    // still places and fills, because I6 is only enforced for non-user
    // slots.
    #[test]
    fn s5_out_of_dictionary_user_theme_word_still_completes() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.5);
        let mut config = base_config();
        config.theme_entries = vec![ThemeEntry::new("ZZZZ", Source::User)];
        let puzzle = generate(&config, &dictionary, None)
            .expect("an out-of-dictionary user theme word should not block generation");

        assert!(puzzle.theme.iter().any(|p| p.entry.word == "ZZZZ"));
        let theme_record = puzzle
            .slots
            .iter()
            .find(|s| s.word == "ZZZZ")
            .expect("the theme word should appear in the slot table");
        assert_eq!(theme_record.source, Source::User);
        assert!(!dictionary.contains("ZZZZ"));
    }

    // Scenario S6: at HARD difficulty, fill slots skew toward the hard end
    // of the difficulty histogram.
    #[test]
    fn s6_hard_difficulty_histogram_skews_hard() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.85);
        let mut config = base_config();
        config.difficulty = Tier::Hard;
        let puzzle = generate(&config, &dictionary, None)
            .expect("a mostly-hard exhaustive dictionary should fill at HARD difficulty");

        let histogram = puzzle.difficulty_histogram;
        assert!(
            histogram.hard > histogram.easy,
            "expected hard-skewed histogram, got {histogram:?}"
        );
    }

    // Theme coverage accounting: placed never exceeds requested, and the
    // counters reflect the configured entries.
    #[test]
    fn theme_coverage_counts_match_requested_and_placed_entries() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.5);
        let mut config = base_config();
        config.theme_entries = vec![
            ThemeEntry::new("ABC", Source::User),
            ThemeEntry::new("ABCD", Source::User),
        ];
        let puzzle = generate(&config, &dictionary, None).expect("user theme words should place");

        assert_eq!(puzzle.theme_coverage.requested, 2);
        assert!(puzzle.theme_coverage.placed <= puzzle.theme_coverage.requested);
        assert_eq!(puzzle.theme_coverage.placed, puzzle.theme.len());
    }

    // A sealed grid round-trips through JSON with the same cell layout and
    // slot registration.
    #[test]
    fn sealed_grid_round_trips_through_json() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.5);
        let config = base_config();
        let puzzle = generate(&config, &dictionary, None)
            .expect("an exhaustive dictionary should always allow a small grid to fill");

        let json = serde_json::to_string(&puzzle.grid).expect("grid serializes");
        let reloaded: Grid = serde_json::from_str(&json).expect("grid deserializes");

        assert_eq!(format!("{}", puzzle.grid), format!("{}", reloaded));
        assert_eq!(
            puzzle.grid.clone().register_slots().to_vec(),
            reloaded.clone().register_slots().to_vec()
        );
    }

    // A clue emitter's returned text is attached to the matching slot
    // record verbatim, with no inspection of its content.
    #[test]
    fn clue_emitter_output_is_attached_without_inspection() {
        let dictionary = exhaustive_dict(&[2, 3, 4], &['A', 'B', 'C', 'D'], 0.5);
        let config = base_config();
        let emitter: &ClueEmitter = &|meta: &SlotMeta| Some(format!("clue for {}", meta.word));
        let puzzle = generate(&config, &dictionary, Some(emitter)).expect("generation should succeed");

        assert!(!puzzle.slots.is_empty());
        for record in &puzzle.slots {
            assert_eq!(record.clue, Some(format!("clue for {}", record.word)));
        }
    }
}
