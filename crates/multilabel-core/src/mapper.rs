//! Value Mapper: bidirectional mapping between cell values and the string
//! tokens that nominal attributes are built from.
//!
//! The mapper only grows. Every distinct value gets exactly one token, the
//! first time it is encoded. A trained model carries its mapper so prediction
//! resolves the same tokens the training run assigned; it must never be
//! rebuilt from scratch.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::table::Cell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MappedValue {
    value: Cell,
    token: String,
}

/// Persisted form: entries in assignment order, so serialization is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MapperEntries {
    entries: Vec<MappedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MapperEntries", into = "MapperEntries")]
pub struct ValueMapper {
    entries: Vec<MappedValue>,
    by_value: HashMap<Cell, usize>,
    by_token: HashMap<String, usize>,
}

impl ValueMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Token for `value`, assigning a fresh one if the value was never seen.
    ///
    /// The token is the value's display form; if another value already owns
    /// that string, a numeric suffix keeps it unique (`1` and `"1"` become
    /// `1` and `1_1`).
    pub fn encode(&mut self, value: &Cell) -> &str {
        if let Some(&idx) = self.by_value.get(value) {
            return &self.entries[idx].token;
        }

        let base = value.to_string();
        let mut token = base.clone();
        let mut suffix = 1;
        while self.by_token.contains_key(&token) {
            token = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        let idx = self.entries.len();
        log::trace!("Mapped value {:?} to token '{}'", value, token);
        self.by_value.insert(value.clone(), idx);
        self.by_token.insert(token.clone(), idx);
        self.entries.push(MappedValue {
            value: value.clone(),
            token,
        });
        &self.entries[idx].token
    }

    /// Token of an already mapped value. Never assigns.
    pub fn token_of(&self, value: &Cell) -> Option<&str> {
        self.by_value
            .get(value)
            .map(|&idx| self.entries[idx].token.as_str())
    }

    /// Original value behind a token.
    pub fn decode(&self, token: &str) -> Option<&Cell> {
        self.by_token.get(token).map(|&idx| &self.entries[idx].value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cell, &str)> + '_ {
        self.entries.iter().map(|e| (&e.value, e.token.as_str()))
    }
}

impl From<MapperEntries> for ValueMapper {
    fn from(persisted: MapperEntries) -> Self {
        let mut mapper = ValueMapper::default();
        for (idx, entry) in persisted.entries.into_iter().enumerate() {
            mapper.by_value.insert(entry.value.clone(), idx);
            mapper.by_token.insert(entry.token.clone(), idx);
            mapper.entries.push(entry);
        }
        mapper
    }
}

impl From<ValueMapper> for MapperEntries {
    fn from(mapper: ValueMapper) -> Self {
        MapperEntries {
            entries: mapper.entries,
        }
    }
}
