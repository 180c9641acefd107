//! Flat-file snapshot of the learned state.
//!
//! Three newline-delimited files:
//! - tokens: one vocabulary string per line, in id order;
//! - values: `word\tposition\tother\tother_position\tvalue` per nonzero
//!   association;
//! - observations: space-separated ids per line, terminated by `-1`.
//!
//! Loading is line-tolerant: anything unparseable is skipped and counted.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assoc::AssocKey;
use crate::config::StorageConfig;
use crate::error::{AmoebaResult, StorageError};
use crate::observation::{ObservationLine, ObservationStore, LINE_TERMINATOR};
use crate::vocabulary::{Lexicon, TokenId};

/// Locations of the three snapshot files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    /// Vocabulary file.
    pub tokens: PathBuf,
    /// Association rows.
    pub values: PathBuf,
    /// Observation lines.
    pub observations: PathBuf,
}

impl SnapshotPaths {
    /// Resolves the configured file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path, config: &StorageConfig) -> Self {
        Self {
            tokens: dir.join(&config.tokens_file),
            values: dir.join(&config.values_file),
            observations: dir.join(&config.observations_file),
        }
    }
}

/// Counts from [`load_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Tokens added to the vocabulary.
    pub tokens: usize,
    /// Token lines already present in the vocabulary.
    pub duplicate_tokens: usize,
    /// Association rows applied.
    pub associations: usize,
    /// Observation lines appended.
    pub observations: usize,
    /// Lines skipped as malformed, across all files.
    pub skipped: usize,
}

/// Counts from [`write_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Tokens written.
    pub tokens: usize,
    /// Association rows written.
    pub associations: usize,
    /// Observation lines written.
    pub observations: usize,
}

/// Loads a snapshot into `lexicon` and `observations`.
///
/// Missing files count as empty.
///
/// # Errors
/// `StorageError::Io` when a present file cannot be read.
pub fn load_snapshot(
    paths: &SnapshotPaths,
    lexicon: &mut Lexicon,
    observations: &mut ObservationStore,
) -> AmoebaResult<LoadReport> {
    let mut report = LoadReport::default();

    // Rows refer to tokens by their line ordinal in the tokens file; a
    // skipped token line must not shift the ids of the lines after it.
    let mut ids: Vec<Option<TokenId>> = Vec::new();
    for_each_line(&paths.tokens, |line| {
        let token = line.trim_end_matches(['\r', '\n']);
        if token.is_empty() {
            return;
        }
        match lexicon.vocabulary.intern(token) {
            Ok((id, true)) => {
                report.tokens += 1;
                ids.push(Some(id));
            }
            Ok((id, false)) => {
                report.duplicate_tokens += 1;
                ids.push(Some(id));
            }
            Err(e) => {
                debug!(error = %e, ordinal = ids.len(), "skipping token line");
                report.skipped += 1;
                ids.push(None);
            }
        }
    })?;

    for_each_line(&paths.values, |line| {
        if line.trim().is_empty() {
            return;
        }
        match parse_association(line, &ids) {
            Some((key, value)) => {
                lexicon.associations.add(key, value);
                report.associations += 1;
            }
            None => {
                debug!(line, "skipping association row");
                report.skipped += 1;
            }
        }
    })?;

    for_each_line(&paths.observations, |line| {
        if line.trim().is_empty() {
            return;
        }
        match parse_observation(line, &ids) {
            Some(tokens) => {
                observations.push(ObservationLine::new(tokens));
                report.observations += 1;
            }
            None => {
                debug!(line, "skipping observation line");
                report.skipped += 1;
            }
        }
    })?;

    if report.skipped > 0 {
        warn!(skipped = report.skipped, "snapshot contained malformed lines");
    }
    info!(
        tokens = report.tokens,
        associations = report.associations,
        observations = report.observations,
        "snapshot loaded"
    );
    Ok(report)
}

/// Writes `lexicon` and `observations`, replacing each file atomically.
///
/// # Errors
/// `StorageError::Io` when a directory or file cannot be written.
pub fn write_snapshot(
    paths: &SnapshotPaths,
    lexicon: &Lexicon,
    observations: &ObservationStore,
) -> AmoebaResult<WriteReport> {
    let mut report = WriteReport::default();

    replace_file(&paths.tokens, |out| {
        for (_, token) in lexicon.vocabulary.iter() {
            writeln!(out, "{token}")?;
            report.tokens += 1;
        }
        Ok(())
    })?;

    replace_file(&paths.values, |out| {
        for (key, value) in lexicon.associations.iter() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{value}",
                key.word, key.position, key.other, key.other_position
            )?;
            report.associations += 1;
        }
        Ok(())
    })?;

    replace_file(&paths.observations, |out| {
        for line in observations.iter() {
            for id in line.tokens() {
                write!(out, "{id} ")?;
            }
            writeln!(out, "{LINE_TERMINATOR}")?;
            report.observations += 1;
        }
        Ok(())
    })?;

    info!(
        tokens = report.tokens,
        associations = report.associations,
        observations = report.observations,
        "snapshot written"
    );
    Ok(report)
}

fn for_each_line(path: &Path, mut apply: impl FnMut(&str)) -> AmoebaResult<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "snapshot file absent");
            return Ok(());
        }
        Err(e) => return Err(StorageError::io(path, e).into()),
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| StorageError::io(path, e))?;
        if read == 0 {
            return Ok(());
        }
        apply(&String::from_utf8_lossy(&buf));
    }
}

fn replace_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> AmoebaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    let mut out = BufWriter::new(file);
    write(&mut out)
        .and_then(|()| out.flush())
        .and_then(|()| out.get_ref().sync_all())
        .map_err(|e| StorageError::io(&tmp, e))?;
    drop(out);

    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

/// Maps a file ordinal to the id it was loaded under, `None` when the
/// ordinal is out of range or its token line was skipped.
fn remap(ordinal: i64, ids: &[Option<TokenId>]) -> Option<TokenId> {
    let index = usize::try_from(ordinal).ok()?;
    ids.get(index).copied().flatten()
}

fn parse_id(field: &str, ids: &[Option<TokenId>]) -> Option<TokenId> {
    remap(field.parse().ok()?, ids)
}

fn parse_association(line: &str, ids: &[Option<TokenId>]) -> Option<(AssocKey, i64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [word, position, other, other_position, value] = fields.as_slice() else {
        return None;
    };
    let key = AssocKey::new(
        parse_id(word, ids)?,
        position.parse().ok()?,
        parse_id(other, ids)?,
        other_position.parse().ok()?,
    );
    let value: i64 = value.parse().ok()?;
    (value != 0).then_some((key, value))
}

fn parse_observation(line: &str, ids: &[Option<TokenId>]) -> Option<Vec<TokenId>> {
    let mut tokens = Vec::new();
    for field in line.split_whitespace() {
        let raw: i64 = field.parse().ok()?;
        if raw == LINE_TERMINATOR {
            break;
        }
        tokens.push(remap(raw, ids)?);
    }
    (!tokens.is_empty()).then_some(tokens)
}
