use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Difficulty tier requested by the caller. Each tier has a center on the
/// `[0,1]` difficulty axis that the scoring function biases candidates
/// toward without hard-excluding the rest (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

impl Tier {
    fn center(&self) -> f64 {
        match self {
            Tier::Easy => 0.15,
            Tier::Medium => 0.45,
            Tier::Hard => 0.80,
        }
    }
}

/// One normalized dictionary entry, ingested from the TSV lexicon.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryEntry {
    pub surface: String,
    pub length: usize,
    pub frequency: f64,
    pub difficulty_score: f64,
    pub is_compound: bool,
    pub is_stopword: bool,
}

impl DictionaryEntry {
    fn base_score(&self) -> f64 {
        let mut base = self.frequency;
        if self.is_compound {
            base -= 0.15;
        }
        if self.is_stopword {
            base -= 0.30;
        }
        base.clamp(0.0, 1.0)
    }

    /// The difficulty-aware score for this entry under the given tier, per
    /// the formula in spec.md §4.1.
    pub fn score(&self, tier: Tier) -> f64 {
        let base = self.base_score();
        let affinity = (1.0 - 3.5 * (self.difficulty_score - tier.center()).abs()).max(0.0);
        let direction = match tier {
            Tier::Easy => 1.0 - self.difficulty_score,
            Tier::Hard => self.difficulty_score,
            Tier::Medium => 0.5,
        };
        0.15 * base + 0.55 * affinity + 0.30 * direction
    }
}

/// A length-`n` list of fixed `(position, letter)` constraints. Positions
/// not present are free.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub length: usize,
    pub fixed: Vec<(usize, char)>,
}

impl Pattern {
    pub fn blank(length: usize) -> Self {
        Pattern {
            length,
            fixed: Vec::new(),
        }
    }

    pub fn from_letters(letters: &[Option<char>]) -> Self {
        let fixed = letters
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|c| (i, c)))
            .collect();
        Pattern {
            length: letters.len(),
            fixed,
        }
    }

    pub(crate) fn matches(&self, surface: &str) -> bool {
        let chars: Vec<char> = surface.chars().collect();
        if chars.len() != self.length {
            return false;
        }
        self.fixed.iter().all(|&(i, c)| chars[i] == c)
    }
}

/// Normalizes a raw surface form to uppercase A-Z, rejecting anything with
/// characters outside that range after folding common Romanian diacritics.
pub fn normalize(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let folded = match ch.to_ascii_uppercase() {
            'Ă' | 'Â' => 'A',
            'Î' => 'I',
            'Ș' | 'Ş' => 'S',
            'Ț' | 'Ţ' => 'T',
            other => other,
        };
        if folded.is_ascii_alphabetic() {
            out.push(folded);
        } else {
            return None;
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// The dictionary index: a normalized word store with length-and-pattern
/// lookup and a difficulty score per entry (spec.md §4.1). Read-only once
/// built, so it can be shared freely across generation attempts and CP
/// solver workers.
#[derive(Debug, Clone, Default)]
pub struct DictionaryIndex {
    entries: Vec<DictionaryEntry>,
    by_length: HashMap<usize, Vec<usize>>,
    by_length_position_letter: HashMap<(usize, usize, char), HashSet<usize>>,
    by_surface: HashMap<String, usize>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DictionaryError {
    #[error("could not open dictionary file {0}: {1}")]
    Io(String, String),
}

impl DictionaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pre-normalized, already-filtered entry. Returns `false` if
    /// an entry with the same surface already exists.
    pub fn insert(&mut self, entry: DictionaryEntry) -> bool {
        if self.by_surface.contains_key(&entry.surface) {
            return false;
        }
        let id = self.entries.len();
        let length = entry.length;
        let chars: Vec<char> = entry.surface.chars().collect();
        self.by_length.entry(length).or_default().push(id);
        for (i, c) in chars.into_iter().enumerate() {
            self.by_length_position_letter
                .entry((length, i, c))
                .or_default()
                .insert(id);
        }
        self.by_surface.insert(entry.surface.clone(), id);
        self.entries.push(entry);
        true
    }

    /// Loads a tab-separated lexicon file with header row and, at minimum,
    /// `surface`, `length`, `frequency`, `is_compound`, `is_stopword` and
    /// optionally `difficulty_score` columns. Rows with `is_adult=1` are
    /// dropped; malformed rows are logged at `warn` and skipped rather than
    /// aborting ingestion, mirroring the teacher's line-skip-on-error
    /// behavior in the original `dictionary.rs`.
    pub fn load_tsv(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path_ref = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path_ref)
            .map_err(|e| DictionaryError::Io(path_ref.display().to_string(), e.to_string()))?;

        let mut index = DictionaryIndex::new();
        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("skipping malformed dictionary row: {e}");
                    continue;
                }
            };
            match row_to_entry(&record, reader.headers().ok()) {
                Some(entry) => {
                    index.insert(entry);
                }
                None => tracing::warn!("skipping unparsable dictionary row: {record:?}"),
            }
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.by_surface.contains_key(word)
    }

    pub fn lookup_by_surface(&self, word: &str) -> Option<&DictionaryEntry> {
        self.by_surface.get(word).map(|&id| &self.entries[id])
    }

    fn candidate_ids(&self, pattern: &Pattern) -> Vec<usize> {
        let all_for_length = match self.by_length.get(&pattern.length) {
            Some(v) => v,
            None => return Vec::new(),
        };
        if pattern.fixed.is_empty() {
            return all_for_length.clone();
        }
        // Intersect the position-letter sets, smallest first, to avoid
        // scanning the whole length bucket when fixed letters narrow it.
        let mut sets: Vec<&HashSet<usize>> = pattern
            .fixed
            .iter()
            .filter_map(|&(i, c)| self.by_length_position_letter.get(&(pattern.length, i, c)))
            .collect();
        if sets.len() != pattern.fixed.len() {
            return Vec::new();
        }
        sets.sort_by_key(|s| s.len());
        let mut iter = sets.into_iter();
        let first = match iter.next() {
            Some(s) => s.clone(),
            None => return all_for_length.clone(),
        };
        iter.fold(first, |acc, s| acc.intersection(s).copied().collect())
            .into_iter()
            .collect()
    }

    /// Returns every entry matching `pattern` and not in `banned`, ordered
    /// by non-increasing score for `tier`.
    pub fn candidates(
        &self,
        pattern: &Pattern,
        banned: &HashSet<String>,
        tier: Tier,
    ) -> Vec<&DictionaryEntry> {
        self.candidates_filtered(pattern, banned, tier, None)
    }

    /// Same as [`Self::candidates`] with an optional strict upper bound on
    /// `difficulty_score`, used for EASY-mode phase 1 (spec.md §4.5).
    pub fn candidates_filtered(
        &self,
        pattern: &Pattern,
        banned: &HashSet<String>,
        tier: Tier,
        max_difficulty: Option<f64>,
    ) -> Vec<&DictionaryEntry> {
        let mut out: Vec<&DictionaryEntry> = self
            .candidate_ids(pattern)
            .into_iter()
            .map(|id| &self.entries[id])
            .filter(|e| pattern.matches(&e.surface))
            .filter(|e| !banned.contains(&e.surface))
            .filter(|e| max_difficulty.map_or(true, |m| e.difficulty_score < m))
            .collect();
        out.sort_by(|a, b| b.score(tier).partial_cmp(&a.score(tier)).unwrap());
        out
    }
}

fn row_to_entry(
    record: &csv::StringRecord,
    headers: Option<&csv::StringRecord>,
) -> Option<DictionaryEntry> {
    let headers = headers?;
    let get = |name: &str| -> Option<&str> {
        headers.iter().position(|h| h == name).and_then(|i| record.get(i))
    };
    let is_adult: bool = get("is_adult").and_then(|v| v.parse::<u8>().ok()).unwrap_or(0) == 1;
    if is_adult {
        return None;
    }
    let raw_surface = get("surface")?;
    let surface = normalize(raw_surface)?;
    let length = surface.chars().count();
    let frequency: f64 = get("frequency").and_then(|v| v.parse().ok())?;
    let is_compound = get("is_compound").and_then(|v| v.parse::<u8>().ok()).unwrap_or(0) == 1;
    let is_stopword = get("is_stopword").and_then(|v| v.parse::<u8>().ok()).unwrap_or(0) == 1;
    let difficulty_score = get("difficulty_score")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(1.0 - frequency);
    Some(DictionaryEntry {
        surface,
        length,
        frequency,
        difficulty_score,
        is_compound,
        is_stopword,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(surface: &str, frequency: f64, difficulty: f64) -> DictionaryEntry {
        DictionaryEntry {
            length: surface.chars().count(),
            surface: surface.to_string(),
            frequency,
            difficulty_score: difficulty,
            is_compound: false,
            is_stopword: false,
        }
    }

    #[test]
    fn normalize_folds_romanian_diacritics() {
        assert_eq!(normalize("cărți").as_deref(), Some("CARTI"));
        assert_eq!(normalize("m99re"), None);
    }

    #[test]
    fn pattern_query_matches_fixed_positions_only() {
        let mut idx = DictionaryIndex::new();
        idx.insert(entry("ACT", 0.5, 0.3));
        idx.insert(entry("ARM", 0.5, 0.3));
        idx.insert(entry("AXE", 0.5, 0.3));
        let pattern = Pattern::from_letters(&[Some('A'), None, Some('T')]);
        let results = idx.candidates(&pattern, &HashSet::new(), Tier::Medium);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].surface, "ACT");
    }

    #[test]
    fn candidates_excludes_banned_words() {
        let mut idx = DictionaryIndex::new();
        idx.insert(entry("CAT", 0.5, 0.3));
        idx.insert(entry("CAR", 0.5, 0.3));
        let pattern = Pattern::from_letters(&[Some('C'), Some('A'), None]);
        let mut banned = HashSet::new();
        banned.insert("CAR".to_string());
        let results = idx.candidates(&pattern, &banned, Tier::Medium);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].surface, "CAT");
    }

    #[test]
    fn candidates_filtered_enforces_strict_difficulty_bound() {
        let mut idx = DictionaryIndex::new();
        idx.insert(entry("EASYWD", 0.8, 0.10));
        idx.insert(entry("HARDWD", 0.2, 0.90));
        let pattern = Pattern::blank(6);
        let results = idx.candidates_filtered(&pattern, &HashSet::new(), Tier::Easy, Some(0.30));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].surface, "EASYWD");
    }

    #[test]
    fn ordering_is_non_increasing_by_score() {
        let mut idx = DictionaryIndex::new();
        idx.insert(entry("ONE", 0.9, 0.10));
        idx.insert(entry("TWO", 0.1, 0.95));
        idx.insert(entry("SIX", 0.5, 0.45));
        let pattern = Pattern::blank(3);
        let results = idx.candidates(&pattern, &HashSet::new(), Tier::Hard);
        let scores: Vec<f64> = results.iter().map(|e| e.score(Tier::Hard)).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn contains_and_lookup_by_surface() {
        let mut idx = DictionaryIndex::new();
        idx.insert(entry("ZEBRA", 0.3, 0.5));
        assert!(idx.contains("ZEBRA"));
        assert!(!idx.contains("HORSE"));
        assert_eq!(idx.lookup_by_surface("ZEBRA").unwrap().length, 5);
    }
}
