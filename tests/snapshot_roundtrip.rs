//! Persistence round-trip tests.
//!
//! A written snapshot loaded into fresh stores must reproduce the vocabulary
//! in order, the same set of nonzero associations, and the observation lines
//! in order.

use std::collections::HashSet;
use std::fs;

use amoeba::learning::reinforce;
use amoeba::{
    load_snapshot, write_snapshot, AssocKey, Lexicon, ObservationLine, ObservationStore,
    SnapshotPaths, StorageConfig,
};
use tempfile::tempdir;

fn populated() -> (Lexicon, ObservationStore) {
    let mut lexicon = Lexicon::with_tokens(["ls", "echo", "hello", "world", "-la"]).unwrap();
    reinforce(&mut lexicon, &[1, 2, 3], 10);
    reinforce(&mut lexicon, &[0, 4], -1);
    reinforce(&mut lexicon, &[1, 2], -10);

    let mut observations = ObservationStore::new();
    observations.push(ObservationLine::new(vec![2, 3]));
    observations.push(ObservationLine::new(vec![0]));
    observations.push(ObservationLine::new(vec![4, 0, 4]));
    (lexicon, observations)
}

#[test]
fn test_write_then_load_reproduces_state() {
    let dir = tempdir().unwrap();
    let paths = SnapshotPaths::in_dir(dir.path(), &StorageConfig::default());
    let (lexicon, observations) = populated();

    let written = write_snapshot(&paths, &lexicon, &observations).unwrap();
    assert_eq!(written.tokens, 5);
    assert_eq!(written.associations, lexicon.associations.len());
    assert_eq!(written.observations, 3);

    let mut loaded_lexicon = Lexicon::new();
    let mut loaded_observations = ObservationStore::new();
    let report = load_snapshot(&paths, &mut loaded_lexicon, &mut loaded_observations).unwrap();
    assert_eq!(report.skipped, 0);

    let tokens: Vec<&str> = loaded_lexicon.vocabulary.iter().map(|(_, t)| t).collect();
    assert_eq!(tokens, vec!["ls", "echo", "hello", "world", "-la"]);

    let original: HashSet<(AssocKey, i64)> = lexicon.associations.iter().collect();
    let restored: HashSet<(AssocKey, i64)> = loaded_lexicon.associations.iter().collect();
    assert_eq!(original, restored);
    // (1,0)<->(2,1) went 10 then -10 and must not have been persisted.
    assert_eq!(restored.iter().filter(|(_, v)| *v == 0).count(), 0);
    assert_eq!(loaded_lexicon.associations.get(AssocKey::new(1, 0, 2, 1)), 0);

    let lines: Vec<Vec<u32>> = loaded_observations.iter().map(|l| l.tokens().to_vec()).collect();
    assert_eq!(lines, vec![vec![2, 3], vec![0], vec![4, 0, 4]]);
}

#[test]
fn test_rewrite_replaces_previous_snapshot() {
    let dir = tempdir().unwrap();
    let paths = SnapshotPaths::in_dir(dir.path(), &StorageConfig::default());
    let (lexicon, observations) = populated();
    write_snapshot(&paths, &lexicon, &observations).unwrap();

    let smaller = Lexicon::with_tokens(["only"]).unwrap();
    write_snapshot(&paths, &smaller, &ObservationStore::new()).unwrap();

    assert_eq!(fs::read_to_string(&paths.tokens).unwrap(), "only\n");
    assert_eq!(fs::read_to_string(&paths.values).unwrap(), "");
    assert_eq!(fs::read_to_string(&paths.observations).unwrap(), "");
}

#[test]
fn test_custom_file_names() {
    let dir = tempdir().unwrap();
    let config = StorageConfig {
        tokens_file: "vocab.lst".to_string(),
        ..StorageConfig::default()
    };
    let paths = SnapshotPaths::in_dir(dir.path(), &config);
    write_snapshot(&paths, &Lexicon::with_tokens(["a"]).unwrap(), &ObservationStore::new()).unwrap();
    assert!(dir.path().join("vocab.lst").exists());
    assert!(dir.path().join("values.csv").exists());
}
