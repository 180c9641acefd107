//! Vocabulary of command tokens.
//!
//! Identifiers are indices into an append-only list: once assigned, an id
//! keeps naming the same string for the lifetime of the process.

use std::collections::HashMap;

use crate::assoc::AssocStore;
use crate::error::ValidationError;

/// Stable identifier of a vocabulary token.
pub type TokenId = u32;

/// Append-only list of unique token strings.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, TokenId>,
}

impl Vocabulary {
    /// Creates an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no token is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the string for `id`, if assigned.
    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Looks up the id of `token`.
    #[must_use]
    pub fn id_of(&self, token: &str) -> Option<TokenId> {
        self.index.get(token).copied()
    }

    /// Returns true if `id` names a token.
    #[must_use]
    pub fn contains_id(&self, id: TokenId) -> bool {
        (id as usize) < self.tokens.len()
    }

    /// Inserts `token` if unseen and returns its id with a flag telling
    /// whether it was newly added.
    ///
    /// # Errors
    /// Tokens must be non-empty and free of whitespace: they are written one
    /// per line and re-tokenized on whitespace.
    pub fn intern(&mut self, token: &str) -> Result<(TokenId, bool), ValidationError> {
        if let Some(id) = self.id_of(token) {
            return Ok((id, false));
        }
        validate_token(token)?;

        let id = TokenId::try_from(self.tokens.len()).map_err(|_| ValidationError::InvalidToken {
            token: token.to_string(),
            reason: "vocabulary is full",
        })?;
        self.tokens.push(token.to_string());
        self.index.insert(token.to_string(), id);
        Ok((id, true))
    }

    /// Iterates `(id, token)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &str)> + '_ {
        (0..).zip(self.tokens.iter().map(String::as_str))
    }

    /// Maps each whitespace-separated word of `text` to its id, dropping
    /// unknown words, and keeps at most `limit` ids.
    #[must_use]
    pub fn tokenize(&self, text: &str, limit: usize) -> Vec<TokenId> {
        text.split_whitespace()
            .filter_map(|word| self.id_of(word))
            .take(limit)
            .collect()
    }
}

fn validate_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::InvalidToken {
            token: token.to_string(),
            reason: "empty",
        });
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidToken {
            token: token.to_string(),
            reason: "contains whitespace",
        });
    }
    Ok(())
}

/// Vocabulary and the associations between its tokens.
///
/// The two live under one lock because association keys are vocabulary ids.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    /// Known tokens.
    pub vocabulary: Vocabulary,
    /// Learned pairwise scores.
    pub associations: AssocStore,
}

impl Lexicon {
    /// Creates an empty lexicon.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a lexicon from an initial token list, skipping duplicates.
    ///
    /// # Errors
    /// Fails on the first invalid token.
    pub fn with_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self, ValidationError> {
        let mut lexicon = Self::new();
        for token in tokens {
            lexicon.vocabulary.intern(token)?;
        }
        Ok(lexicon)
    }
}
