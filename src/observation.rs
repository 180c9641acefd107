//! Observation store and proximity similarity.
//!
//! Each observation is one tokenized command output. Lines are only ever
//! appended; the store is what redundancy of new output is measured against.

use crate::vocabulary::TokenId;

/// Terminator written after every observation line on disk.
pub const LINE_TERMINATOR: i64 = -1;

/// One tokenized output line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservationLine(Vec<TokenId>);

impl ObservationLine {
    /// Wraps a token sequence.
    #[must_use]
    pub fn new(tokens: Vec<TokenId>) -> Self {
        Self(tokens)
    }

    /// Tokens of the line, without terminator.
    #[must_use]
    pub fn tokens(&self) -> &[TokenId] {
        &self.0
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the line has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<TokenId>> for ObservationLine {
    fn from(tokens: Vec<TokenId>) -> Self {
        Self(tokens)
    }
}

/// Best match found by [`ObservationStore::most_similar`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatch {
    /// Index of the stored line.
    pub index: usize,
    /// Similarity percentage in `[0, 100]`.
    pub score: f32,
}

/// Proximity-weighted similarity of `candidate` against `stored`, as a
/// percentage of `candidate`'s length.
///
/// Every candidate token contributes `1 / (1 + d)`, where `d` is the
/// distance between its index and the nearest index holding the same id
/// in `stored`, or nothing when the id is absent.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn proximity_similarity(candidate: &[TokenId], stored: &[TokenId]) -> f32 {
    if candidate.is_empty() || stored.is_empty() {
        return 0.0;
    }

    let total: f32 = candidate
        .iter()
        .enumerate()
        .filter_map(|(i, &token)| {
            stored
                .iter()
                .enumerate()
                .filter(|&(_, &other)| other == token)
                .map(|(j, _)| i.abs_diff(j))
                .min()
        })
        .map(|distance| 1.0 / (1.0 + distance as f32))
        .sum();

    total / candidate.len() as f32 * 100.0
}

/// Append-only list of observation lines.
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    lines: Vec<ObservationLine>,
}

impl ObservationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if nothing was observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Appends a line.
    pub fn push(&mut self, line: ObservationLine) {
        self.lines.push(line);
    }

    /// Returns the line at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ObservationLine> {
        self.lines.get(index)
    }

    /// Iterates stored lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ObservationLine> + '_ {
        self.lines.iter()
    }

    /// Finds the stored line most similar to `candidate`.
    ///
    /// The scan stops at the first line scoring at least `threshold`.
    /// Returns `None` when the store is empty or nothing overlaps.
    #[must_use]
    pub fn most_similar(&self, candidate: &[TokenId], threshold: f32) -> Option<SimilarityMatch> {
        let mut best: Option<SimilarityMatch> = None;
        for (index, line) in self.lines.iter().enumerate() {
            let score = proximity_similarity(candidate, line.tokens());
            if score > best.map_or(0.0, |b| b.score) {
                best = Some(SimilarityMatch { index, score });
            }
            if best.is_some_and(|b| b.score >= threshold) {
                break;
            }
        }
        best
    }
}
