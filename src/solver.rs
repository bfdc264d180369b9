use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dictionary::{DictionaryIndex, Pattern, Tier};
use crate::error::{SolverError, SolverResult};
use crate::grid::{CellType, Grid, Slot};

/// Parameters for one CP fill attempt (spec.md §4.5). `max_difficulty_score`
/// is the strict per-slot cutoff; slots may exceed it only up to
/// `medium_slot_limit` times across the whole grid.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub tier: Tier,
    pub max_difficulty_score: Option<f64>,
    pub medium_slot_limit: usize,
    pub banned: HashSet<String>,
    pub deadline: Instant,
    pub workers: usize,
    pub seed: u64,
    pub attempt: usize,
}

/// One candidate word for a slot, tagged with whether placing it would
/// spend one unit of the solver's medium-slot budget.
#[derive(Debug, Clone)]
struct Candidate {
    word: String,
    relaxed: bool,
}

/// Fills every length->=2 slot of `grid` with mutually unique words
/// satisfying every crossing constraint, mutating `grid` in place on
/// success. Runs `config.workers` randomized-restart searches in parallel
/// and takes the first to finish; every restart is seeded deterministically
/// from `(config.seed, config.attempt, restart_index)` so a given config
/// always explores the same sequence of restarts (property P8).
pub fn cp_fill(grid: &mut Grid, dictionary: &DictionaryIndex, config: &SolverConfig) -> SolverResult<()> {
    let slots = grid.register_slots().to_vec();
    if slots.is_empty() {
        return Ok(());
    }
    let domains = build_domains(grid, &slots, dictionary, config);
    let order = order_slots(&slots, &domains);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .expect("thread pool with a positive worker count always builds");

    let found = Arc::new(AtomicBool::new(false));
    let outcomes: Vec<RestartOutcome> = pool.install(|| {
        (0..config.workers.max(1))
            .into_par_iter()
            .map(|restart_index| {
                run_restart(grid, &slots, &domains, &order, config, restart_index, &found)
            })
            .collect()
    });

    if let Some(RestartOutcome::Solved(filled)) = outcomes
        .into_iter()
        .find(|o| matches!(o, RestartOutcome::Solved(_)))
    {
        *grid = filled;
        return Ok(());
    }
    if Instant::now() >= config.deadline {
        Err(SolverError::Timeout)
    } else {
        Err(SolverError::Unsat)
    }
}

enum RestartOutcome {
    Solved(Grid),
    Exhausted,
}

fn run_restart(
    grid: &Grid,
    slots: &[Slot],
    domains: &[Vec<Candidate>],
    order: &[usize],
    config: &SolverConfig,
    restart_index: usize,
    found: &Arc<AtomicBool>,
) -> RestartOutcome {
    let mut rng = ChaCha8Rng::seed_from_u64(restart_seed(config, restart_index));
    let mut working = grid.clone();
    let mut state = SearchState {
        used_words: HashSet::new(),
        relaxed_spent: 0,
        medium_slot_limit: config.medium_slot_limit,
        deadline: config.deadline,
        found: found.clone(),
    };
    if backtrack(&mut working, slots, domains, order, 0, &mut state, &mut rng) {
        found.store(true, Ordering::SeqCst);
        RestartOutcome::Solved(working)
    } else {
        RestartOutcome::Exhausted
    }
}

fn restart_seed(config: &SolverConfig, restart_index: usize) -> u64 {
    config
        .seed
        .wrapping_add((config.attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((restart_index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
}

struct SearchState {
    used_words: HashSet<String>,
    relaxed_spent: usize,
    medium_slot_limit: usize,
    deadline: Instant,
    found: Arc<AtomicBool>,
}

fn backtrack(
    grid: &mut Grid,
    slots: &[Slot],
    domains: &[Vec<Candidate>],
    order: &[usize],
    depth: usize,
    state: &mut SearchState,
    rng: &mut ChaCha8Rng,
) -> bool {
    if state.found.load(Ordering::Relaxed) || Instant::now() >= state.deadline {
        return false;
    }
    if depth == order.len() {
        return true;
    }
    let slot_idx = order[depth];
    let slot = &slots[slot_idx];
    let pattern = current_pattern(grid, slot);

    let mut candidates: Vec<&Candidate> = domains[slot_idx]
        .iter()
        .filter(|c| pattern.matches(&c.word))
        .filter(|c| !state.used_words.contains(&c.word))
        .filter(|c| !c.relaxed || state.relaxed_spent < state.medium_slot_limit)
        .collect();
    // Dictionary-backed domains arrive from build_domains already sorted
    // best-for-tier-first; shuffling here would defeat that ordering and
    // make tier selection arbitrary. Only the synthetic two-letter domain
    // (no tier scoring at all) is shuffled, for restart diversity.
    if slot.length < 3 {
        candidates.shuffle(rng);
    }

    for candidate in candidates {
        if state.found.load(Ordering::Relaxed) || Instant::now() >= state.deadline {
            return false;
        }
        let token = grid.snapshot();
        if assign(grid, slot, &candidate.word).is_err() {
            grid.rollback(token).expect("token just created");
            continue;
        }
        if !forward_check(grid, slots, domains, order, depth + 1, state) {
            grid.rollback(token).expect("token just created");
            continue;
        }
        state.used_words.insert(candidate.word.clone());
        if candidate.relaxed {
            state.relaxed_spent += 1;
        }

        if backtrack(grid, slots, domains, order, depth + 1, state, rng) {
            return true;
        }

        state.used_words.remove(&candidate.word);
        if candidate.relaxed {
            state.relaxed_spent -= 1;
        }
        grid.rollback(token).expect("token just created");
    }
    false
}

fn assign(grid: &mut Grid, slot: &Slot, word: &str) -> Result<(), ()> {
    for (cell, ch) in slot.cells.iter().zip(word.chars()) {
        if grid.place_letter(cell.row, cell.col, ch).is_err() {
            return Err(());
        }
    }
    Ok(())
}

fn current_pattern(grid: &Grid, slot: &Slot) -> Pattern {
    let letters: Vec<Option<char>> = slot
        .cells
        .iter()
        .map(|c| match grid.get(c.row, c.col) {
            CellType::Letter(ch) => Some(ch),
            _ => None,
        })
        .collect();
    Pattern::from_letters(&letters)
}

/// After tentatively assigning the slot at `order[depth - 1]`, checks that
/// every slot still to be assigned retains at least one legal candidate.
/// This is the forward-checking step: it prunes branches before recursing
/// rather than discovering the dead end several slots later.
fn forward_check(
    grid: &Grid,
    slots: &[Slot],
    domains: &[Vec<Candidate>],
    order: &[usize],
    from_depth: usize,
    state: &SearchState,
) -> bool {
    for &slot_idx in &order[from_depth..] {
        let slot = &slots[slot_idx];
        let pattern = current_pattern(grid, slot);
        let still_open = domains[slot_idx].iter().any(|c| {
            pattern.matches(&c.word)
                && !state.used_words.contains(&c.word)
                && (!c.relaxed || state.relaxed_spent < state.medium_slot_limit)
        });
        if !still_open {
            return false;
        }
    }
    true
}

/// Builds each slot's candidate list up front: dictionary matches for
/// length->=3 slots (tagged `relaxed` when they exceed the strict cutoff),
/// and every letter pair for length-2 slots, which have no dictionary
/// backing but must still be mutually unique (I7).
fn build_domains(
    grid: &Grid,
    slots: &[Slot],
    dictionary: &DictionaryIndex,
    config: &SolverConfig,
) -> Vec<Vec<Candidate>> {
    slots
        .iter()
        .map(|slot| {
            let pattern = current_pattern(grid, slot);
            if slot.length < 3 {
                two_letter_domain(&pattern)
            } else {
                dictionary
                    .candidates_filtered(&pattern, &config.banned, config.tier, None)
                    .into_iter()
                    .map(|entry| Candidate {
                        word: entry.surface.clone(),
                        relaxed: config
                            .max_difficulty_score
                            .is_some_and(|m| entry.difficulty_score >= m),
                    })
                    .collect()
            }
        })
        .collect()
}

fn two_letter_domain(pattern: &Pattern) -> Vec<Candidate> {
    let fixed: Vec<Option<char>> = {
        let mut v = vec![None; pattern.length];
        for &(i, c) in &pattern.fixed {
            v[i] = Some(c);
        }
        v
    };
    let mut out = Vec::new();
    let first_range: Vec<char> = match fixed.first().copied().flatten() {
        Some(c) => vec![c],
        None => ('A'..='Z').collect(),
    };
    let second_range: Vec<char> = match fixed.get(1).copied().flatten() {
        Some(c) => vec![c],
        None => ('A'..='Z').collect(),
    };
    for a in &first_range {
        for b in &second_range {
            out.push(Candidate {
                word: format!("{a}{b}"),
                relaxed: false,
            });
        }
    }
    out
}

/// Most-constrained-first static variable ordering: slots with the fewest
/// initial candidates go first, longer slots break ties (they're harder to
/// satisfy later once crossings start pinning letters).
fn order_slots(slots: &[Slot], domains: &[Vec<Candidate>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..slots.len()).collect();
    order.sort_by_key(|&i| (domains[i].len(), std::cmp::Reverse(slots[i].length)));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictionaryEntry;
    use std::time::Duration;

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

    fn config() -> SolverConfig {
        SolverConfig {
            tier: Tier::Medium,
            max_difficulty_score: None,
            medium_slot_limit: 0,
            banned: HashSet::new(),
            deadline: Instant::now() + Duration::from_secs(5),
            workers: 2,
            seed: 7,
            attempt: 0,
        }
    }

    #[test]
    fn fills_a_small_grid_with_crossing_words() {
        // 2x3: one length-3 across slot (needs a real dictionary word) plus
        // three length-2 slots, which draw from the built-in letter-pair
        // domain rather than the dictionary.
        let mut grid = Grid::new(2, 3);
        let dictionary = dict_with(&["CAT", "DOG", "RAT"]);
        let result = cp_fill(&mut grid, &dictionary, &config());
        assert!(result.is_ok());
        assert_eq!(grid.get(0, 0), CellType::ClueBox);
        for (r, c) in [(0, 1), (0, 2), (1, 0), (1, 1), (1, 2)] {
            assert!(matches!(grid.get(r, c), CellType::Letter(_)));
        }
    }

    #[test]
    fn reports_unsat_when_no_dictionary_words_exist() {
        // A single length-4 across slot with no matching dictionary entries.
        let mut grid = Grid::new(1, 5);
        let dictionary = DictionaryIndex::new();
        let result = cp_fill(&mut grid, &dictionary, &config());
        assert!(matches!(result, Err(SolverError::Unsat)));
    }

    #[test]
    fn same_config_is_deterministic_across_runs() {
        let dictionary = dict_with(&["CAT", "DOG", "RAT"]);
        let mut g1 = Grid::new(2, 3);
        let mut g2 = Grid::new(2, 3);
        cp_fill(&mut g1, &dictionary, &config()).unwrap();
        cp_fill(&mut g2, &dictionary, &config()).unwrap();
        assert_eq!(format!("{g1}"), format!("{g2}"));
    }
}
