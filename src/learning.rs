//! Reward computation and association updates.
//!
//! Captured output is tokenized against the vocabulary (unknown words are
//! dropped, never added), compared with stored observations for redundancy,
//! and the resulting reward is added to every ordered pair of positions of
//! the executed command.

use crate::assoc::AssocKey;
use crate::config::{LearningConfig, Limits};
use crate::error::AmoebaResult;
use crate::observation::{ObservationLine, SimilarityMatch};
use crate::state::SharedState;
use crate::vocabulary::{Lexicon, TokenId};

/// What a single learning update did.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningOutcome {
    /// Reward applied to the command's associations.
    pub reward: i64,
    /// Known tokens found in the output.
    pub tokens: usize,
    /// Closest stored observation, if any overlapped.
    pub best_match: Option<SimilarityMatch>,
    /// Whether the output was judged redundant.
    pub redundant: bool,
    /// Whether the tokenized line was appended to the observation store.
    pub stored: bool,
}

/// Turns command output into rewards and association updates.
#[derive(Debug, Clone, Copy)]
pub struct Learner {
    config: LearningConfig,
    line_capacity: usize,
}

impl Learner {
    /// Creates a learner.
    #[must_use]
    pub fn new(config: LearningConfig, limits: &Limits) -> Self {
        Self {
            config,
            line_capacity: limits.line_capacity,
        }
    }

    /// Reward configuration in use.
    #[must_use]
    pub const fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Scores `output` of `command` and applies the reward.
    ///
    /// Each store is locked on its own: the lexicon for tokenization, the
    /// observations for the redundancy check and append, then the lexicon
    /// again for the pairwise update, which runs entirely under that one
    /// acquisition.
    pub fn update(&self, state: &SharedState, output: &[u8], command: &[TokenId]) -> AmoebaResult<LearningOutcome> {
        let text = String::from_utf8_lossy(output);
        let line = {
            let lexicon = state.lexicon()?;
            lexicon.vocabulary.tokenize(&text, self.line_capacity)
        };

        let mut outcome = LearningOutcome {
            reward: self.config.default_reward,
            tokens: line.len(),
            best_match: None,
            redundant: false,
            stored: false,
        };

        if !line.is_empty() {
            let mut observations = state.observations()?;
            let best = observations.most_similar(&line, self.config.redundancy_threshold);
            let redundant = best.map_or(0.0, |b| b.score) >= self.config.redundancy_threshold;

            if !redundant || self.config.store_redundant {
                observations.push(ObservationLine::new(line));
                outcome.stored = true;
            }
            drop(observations);

            outcome.best_match = best;
            outcome.redundant = redundant;
            outcome.reward = if redundant {
                -self.config.penalty
            } else {
                self.config.reward
            };
        }

        let mut lexicon = state.lexicon()?;
        reinforce(&mut lexicon, command, outcome.reward);

        Ok(outcome)
    }
}

/// Adds `reward` to the association of every ordered pair of distinct
/// positions in `command`.
pub fn reinforce(lexicon: &mut Lexicon, command: &[TokenId], reward: i64) {
    for (a, &word) in (0u32..).zip(command) {
        for (b, &other) in (0u32..).zip(command) {
            if a != b {
                lexicon.associations.add(AssocKey::new(word, a, other, b), reward);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::AmoebaConfig;
    use crate::observation::ObservationStore;

    fn state_with(tokens: &[&str], observations: ObservationStore) -> SharedState {
        let lexicon = Lexicon::with_tokens(tokens.iter().copied()).unwrap();
        SharedState::from_config(&AmoebaConfig::default(), lexicon, observations)
    }

    fn learner() -> Learner {
        Learner::new(LearningConfig::default(), &Limits::default())
    }

    #[test]
    fn unknown_output_earns_default_reward() {
        let state = state_with(&["echo", "hi"], ObservationStore::new());
        let outcome = learner().update(&state, b"nothing known here\n", &[0, 1]).unwrap();

        assert_eq!(outcome.reward, 1);
        assert_eq!(outcome.tokens, 0);
        assert!(!outcome.stored);
        assert!(state.observations().unwrap().is_empty());

        let lexicon = state.lexicon().unwrap();
        assert_eq!(lexicon.associations.get(AssocKey::new(0, 0, 1, 1)), 1);
        assert_eq!(lexicon.associations.get(AssocKey::new(1, 1, 0, 0)), 1);
        // Unknown words never grow the vocabulary.
        assert_eq!(lexicon.vocabulary.len(), 2);
    }

    #[test]
    fn novel_output_is_rewarded_and_stored() {
        let state = state_with(&["echo", "hello", "world"], ObservationStore::new());
        let outcome = learner().update(&state, b"hello world\n", &[0, 1, 2]).unwrap();

        assert_eq!(outcome.reward, 10);
        assert_eq!(outcome.tokens, 2);
        assert!(!outcome.redundant);
        assert!(outcome.stored);

        let observations = state.observations().unwrap();
        assert_eq!(observations.get(0).unwrap().tokens(), &[1, 2]);
        drop(observations);

        let lexicon = state.lexicon().unwrap();
        assert_eq!(lexicon.associations.len(), 6);
        assert_eq!(lexicon.associations.get(AssocKey::new(2, 2, 0, 0)), 10);
    }

    #[test]
    fn repeated_output_is_penalized() {
        let state = state_with(&["echo", "hello", "world"], ObservationStore::new());
        let l = learner();
        l.update(&state, b"hello world", &[0, 1]).unwrap();
        let outcome = l.update(&state, b"hello world", &[0, 1]).unwrap();

        assert!(outcome.redundant);
        assert_eq!(outcome.reward, -1);
        assert!(outcome.stored);
        assert_eq!(state.observations().unwrap().len(), 2);
        assert_eq!(
            state.lexicon().unwrap().associations.get(AssocKey::new(0, 0, 1, 1)),
            9
        );
    }

    #[test]
    fn redundant_lines_can_be_discarded() {
        let state = state_with(&["a", "b"], ObservationStore::new());
        let l = Learner::new(
            LearningConfig {
                store_redundant: false,
                ..LearningConfig::default()
            },
            &Limits::default(),
        );
        l.update(&state, b"a b", &[0]).unwrap();
        let outcome = l.update(&state, b"a b", &[0]).unwrap();
        assert!(outcome.redundant);
        assert!(!outcome.stored);
        assert_eq!(state.observations().unwrap().len(), 1);
    }

    #[test]
    fn below_threshold_is_novel() {
        let mut observations = ObservationStore::new();
        observations.push(ObservationLine::new(vec![0, 1, 2]));
        let state = state_with(&["w0", "w1", "w2", "w3"], observations);

        let outcome = learner().update(&state, b"w0 w1 w3", &[3]).unwrap();
        let best = outcome.best_match.unwrap();
        assert!((best.score - 200.0 / 3.0).abs() < 1e-3);
        assert!(!outcome.redundant);
        assert_eq!(outcome.reward, 10);
    }

    #[test]
    fn zero_threshold_treats_every_line_as_redundant() {
        let state = state_with(&["a", "b", "c"], ObservationStore::new());
        let l = Learner::new(
            LearningConfig {
                redundancy_threshold: 0.0,
                ..LearningConfig::default()
            },
            &Limits::default(),
        );
        let first = l.update(&state, b"a", &[0, 1]).unwrap();
        assert!(first.redundant);
        assert!(first.best_match.is_none());

        // no overlap with the stored line, still at or above a zero threshold
        let second = l.update(&state, b"c", &[0, 1]).unwrap();
        assert!(second.redundant);
        assert_eq!(second.reward, -1);
    }

    #[test]
    fn concurrent_updates_sum_exactly() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let state = state_with(&["w0", "w1", "w2", "w3"], ObservationStore::new());
        let l = learner();
        let command = [0, 1, 2, 3];

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        let outcome = l.update(&state, b"unrelated", &command).unwrap();
                        assert_eq!(outcome.reward, 1);
                    }
                });
            }
        });

        let expected = i64::try_from(THREADS * ROUNDS).unwrap();
        let lexicon = state.lexicon().unwrap();
        assert_eq!(lexicon.associations.len(), 12);
        for (a, &word) in (0u32..).zip(&command) {
            for (b, &other) in (0u32..).zip(&command) {
                if a != b {
                    assert_eq!(lexicon.associations.get(AssocKey::new(word, a, other, b)), expected);
                }
            }
        }
    }

    #[test]
    fn reaching_zero_removes_association() {
        let mut lexicon = Lexicon::with_tokens(["x", "y"]).unwrap();
        reinforce(&mut lexicon, &[0, 1], 3);
        reinforce(&mut lexicon, &[0, 1], -3);
        assert!(lexicon.associations.is_empty());
    }

    #[test]
    fn single_token_command_has_no_pairs() {
        let mut lexicon = Lexicon::with_tokens(["x"]).unwrap();
        reinforce(&mut lexicon, &[0], 10);
        assert!(lexicon.associations.is_empty());
    }
}
