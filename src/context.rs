use crate::schema::StructuredOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output of a single stage as stored in the named context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "output", rename_all = "snake_case")]
pub enum StageValue {
    /// Free-text reply (e.g. a recipe draft or raw research notes).
    Text(String),
    /// Reply validated against an output schema.
    Structured(StructuredOutput),
}

impl StageValue {
    /// Render for interpolation into a downstream prompt, or for the
    /// output transformer. Structured values become compact JSON.
    pub fn as_prompt_text(&self) -> String {
        match self {
            StageValue::Text(s) => s.clone(),
            StageValue::Structured(s) => s.to_json().to_string(),
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredOutput> {
        match self {
            StageValue::Structured(s) => Some(s),
            StageValue::Text(_) => None,
        }
    }
}

/// Outputs accumulated during one pipeline run, keyed by output name.
///
/// Composers hand each stage a shared reference to the context so far and
/// merge the entries it returns; nothing writes to a context concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    entries: BTreeMap<String, StageValue>,
}

impl NamedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: StageValue) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: StageValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&StageValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry of `other` into `self`, overwriting on key clash.
    pub fn merge(&mut self, other: NamedContext) {
        self.entries.extend(other.entries);
    }

    /// Remove and return an entry.
    pub fn take(&mut self, key: &str) -> Option<StageValue> {
        self.entries.remove(key)
    }
}

impl IntoIterator for NamedContext {
    type Item = (String, StageValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, StageValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
