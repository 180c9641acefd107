//! Association-guided command construction.
//!
//! A command starts from one random token drawn out of a sampled slice of the
//! vocabulary. Every further position is filled greedily by the remaining
//! candidate whose associations with the tokens already placed score
//! highest, ties broken at random.

use rand::Rng;

use crate::assoc::{AssocKey, AssocStore};
use crate::config::Limits;
use crate::error::AmoebaResult;
use crate::state::SharedState;
use crate::vocabulary::{Lexicon, TokenId, Vocabulary};

/// Builds a command under the state's locks.
///
/// Lock order: lexicon, then settings (released right after the snapshot),
/// then lexicon released at the end.
pub fn construct_command<R: Rng>(state: &SharedState, rng: &mut R) -> AmoebaResult<Vec<TokenId>> {
    let lexicon = state.lexicon()?;
    let (length, scope, limits) = {
        let settings = state.settings()?;
        (settings.length(), settings.scope(), *settings.limits())
    };
    Ok(build_command(&lexicon, length, scope, &limits, rng))
}

/// Builds a command of at most `length` distinct tokens from `lexicon`.
///
/// `length` is clamped to `[cmd_min, cmd_max]` and to the vocabulary size;
/// `scope` is clamped to `[scope_min, scope_max]`. Returns an empty command
/// when the vocabulary is empty.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn build_command<R: Rng>(
    lexicon: &Lexicon,
    length: usize,
    scope: u8,
    limits: &Limits,
    rng: &mut R,
) -> Vec<TokenId> {
    let n = lexicon.vocabulary.len();
    if n == 0 {
        return Vec::new();
    }

    let want = length.clamp(limits.cmd_min, limits.cmd_max).min(n);
    let scope = scope.clamp(limits.scope_min, limits.scope_max);
    let sample_size = ((n as f64 * f64::from(scope) / 100.0).round() as usize).clamp(1, n);

    let mut pool = sample_candidates(n, sample_size, rng);

    let mut chosen = Vec::with_capacity(want);
    chosen.push(pool.swap_remove(rng.random_range(0..pool.len())));

    while chosen.len() < want && !pool.is_empty() {
        let idx = greedy_pick(&lexicon.associations, &pool, &chosen, rng)
            .unwrap_or_else(|| rng.random_range(0..pool.len()));
        chosen.push(pool.swap_remove(idx));
    }

    chosen
}

/// Partial Fisher–Yates shuffle of `[0, n)` keeping the first `k` entries.
fn sample_candidates<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<TokenId> {
    let mut ids: Vec<TokenId> = (0..).take(n).collect();
    for i in 0..k.min(n) {
        let j = rng.random_range(i..n);
        ids.swap(i, j);
    }
    ids.truncate(k);
    ids
}

/// Bidirectional association score of `candidate` placed at `position`
/// against every chosen token at its own position.
fn pair_score(assoc: &AssocStore, candidate: TokenId, position: u32, chosen: &[TokenId]) -> i64 {
    (0u32..)
        .zip(chosen)
        .map(|(q, &placed)| assoc.get_bidirectional(AssocKey::new(candidate, position, placed, q)))
        .fold(0i64, i64::saturating_add)
}

/// Index into `pool` of the best-scoring candidate for the next position.
fn greedy_pick<R: Rng>(
    assoc: &AssocStore,
    pool: &[TokenId],
    chosen: &[TokenId],
    rng: &mut R,
) -> Option<usize> {
    let position = u32::try_from(chosen.len()).ok()?;
    let mut best = i64::MIN;
    let mut ties: Vec<usize> = Vec::new();

    for (idx, &candidate) in pool.iter().enumerate() {
        let score = pair_score(assoc, candidate, position, chosen);
        if score > best {
            best = score;
            ties.clear();
            ties.push(idx);
        } else if score == best {
            ties.push(idx);
        }
    }

    if ties.is_empty() {
        return None;
    }
    Some(ties[rng.random_range(0..ties.len())])
}

/// Joins the tokens of `command` with single spaces, skipping ids outside the
/// vocabulary. Returns `None` when nothing renders.
#[must_use]
pub fn render_command(vocabulary: &Vocabulary, command: &[TokenId]) -> Option<String> {
    let words: Vec<&str> = command.iter().filter_map(|&id| vocabulary.get(id)).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::observation::ObservationStore;
    use crate::settings::CommandSettings;
    use crate::trend::TrendTracker;

    fn lexicon(n: usize) -> Lexicon {
        let names: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
        Lexicon::with_tokens(names.iter().map(String::as_str)).unwrap()
    }

    #[test]
    fn empty_vocabulary_builds_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        let cmd = build_command(&Lexicon::new(), 5, 100, &Limits::default(), &mut rng);
        assert!(cmd.is_empty());
    }

    #[test]
    fn respects_length_and_vocabulary_bounds() {
        let limits = Limits::default();
        let lex = lexicon(30);
        let mut rng = StdRng::seed_from_u64(42);
        for seed_len in [0usize, 1, 3, 10, 50] {
            for scope in [0u8, 1, 50, 100] {
                let cmd = build_command(&lex, seed_len, scope, &limits, &mut rng);
                let expected_max = seed_len.clamp(limits.cmd_min, limits.cmd_max);
                assert!(!cmd.is_empty());
                assert!(cmd.len() <= expected_max);
                assert!(cmd.iter().all(|&id| (id as usize) < 30));
            }
        }
    }

    #[test]
    fn tokens_are_distinct() {
        let lex = lexicon(6);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let mut cmd = build_command(&lex, 6, 100, &Limits::default(), &mut rng);
            assert_eq!(cmd.len(), 6);
            cmd.sort_unstable();
            cmd.dedup();
            assert_eq!(cmd.len(), 6);
        }
    }

    #[test]
    fn small_vocabulary_caps_length() {
        let lex = lexicon(2);
        let mut rng = StdRng::seed_from_u64(9);
        let cmd = build_command(&lex, 10, 100, &Limits::default(), &mut rng);
        assert_eq!(cmd.len(), 2);
    }

    #[test]
    fn tiny_scope_samples_at_least_one() {
        let lex = lexicon(3);
        let mut rng = StdRng::seed_from_u64(11);
        let cmd = build_command(&lex, 3, 1, &Limits::default(), &mut rng);
        // One percent of three rounds to zero, clamped to a single candidate.
        assert_eq!(cmd.len(), 1);
    }

    #[test]
    fn association_steers_second_position() {
        let mut lex = lexicon(4);
        lex.associations.add(AssocKey::new(0, 0, 1, 1), 10);

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let cmd = build_command(&lex, 2, 100, &Limits::default(), &mut rng);
            if cmd[0] == 0 {
                assert_eq!(cmd, vec![0, 1], "seed {seed}");
            }
        }
    }

    #[test]
    fn greedy_pick_reads_both_directions() {
        let mut assoc = AssocStore::new();
        // Only the reverse direction (chosen -> candidate) is stored.
        assoc.add(AssocKey::new(0, 0, 3, 1), 4);
        let mut rng = StdRng::seed_from_u64(1);
        let pick = greedy_pick(&assoc, &[1, 2, 3], &[0], &mut rng).unwrap();
        assert_eq!(pick, 2);
    }

    #[test]
    fn negative_scores_are_avoided() {
        let mut lex = lexicon(3);
        lex.associations.add(AssocKey::new(0, 0, 1, 1), -5);
        let mut rng = StdRng::seed_from_u64(5);
        let pick = greedy_pick(&lex.associations, &[1, 2], &[0], &mut rng).unwrap();
        assert_eq!(pick, 1);
    }

    #[test]
    fn construct_command_uses_current_settings() {
        let limits = Limits::default();
        let state = SharedState::new(
            lexicon(20),
            ObservationStore::new(),
            CommandSettings::new(4, 100, limits),
            TrendTracker::new(10, 0.5),
        );
        let mut rng = StdRng::seed_from_u64(21);
        assert_eq!(construct_command(&state, &mut rng).unwrap().len(), 4);

        state.settings().unwrap().set_length(2);
        assert_eq!(construct_command(&state, &mut rng).unwrap().len(), 2);
    }

    #[test]
    fn render_skips_unknown_ids() {
        let lex = Lexicon::with_tokens(["echo", "hello"]).unwrap();
        assert_eq!(render_command(&lex.vocabulary, &[0, 7, 1]).as_deref(), Some("echo hello"));
        assert_eq!(render_command(&lex.vocabulary, &[9]), None);
        assert_eq!(render_command(&lex.vocabulary, &[]), None);
    }
}
