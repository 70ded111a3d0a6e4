//! Insertion-ordered hash mapping and set
//!
//! Entries live in a vector in insertion order; a hash index maps each key
//! hash to the positions of the entries sharing it.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::error::ScriptResult;
use crate::value::Value;

/// Insertion-ordered mapping from hashable values to values
#[derive(Default)]
pub struct Dict {
    entries: RefCell<Vec<(Value, Value)>>,
    index: RefCell<FxHashMap<u64, Vec<usize>>>,
}

impl Dict {
    /// Create an empty dict
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty dict with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RefCell::new(Vec::with_capacity(capacity)),
            index: RefCell::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
        }
    }

    /// Build a dict from key/value pairs; later duplicates overwrite earlier ones
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> ScriptResult<Self> {
        let dict = Self::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the dict is empty
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn position(&self, key: &Value, hash: u64) -> Option<usize> {
        let index = self.index.borrow();
        let entries = self.entries.borrow();
        index
            .get(&hash)?
            .iter()
            .copied()
            .find(|&i| entries[i].0 == *key)
    }

    /// Insert or overwrite; returns the previous value for the key.
    ///
    /// Fails with `Unhashable` when the key cannot be hashed.
    pub fn insert(&self, key: Value, value: Value) -> ScriptResult<Option<Value>> {
        let hash = key.hash()?;
        if let Some(i) = self.position(&key, hash) {
            let old = std::mem::replace(&mut self.entries.borrow_mut()[i].1, value);
            return Ok(Some(old));
        }
        let mut entries = self.entries.borrow_mut();
        self.index
            .borrow_mut()
            .entry(hash)
            .or_default()
            .push(entries.len());
        entries.push((key, value));
        Ok(None)
    }

    /// Look up `key`
    pub fn get(&self, key: &Value) -> ScriptResult<Option<Value>> {
        let hash = key.hash()?;
        Ok(self
            .position(key, hash)
            .map(|i| self.entries.borrow()[i].1.clone()))
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &Value) -> ScriptResult<bool> {
        let hash = key.hash()?;
        Ok(self.position(key, hash).is_some())
    }

    /// Snapshot of the entries in insertion order
    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.borrow().clone()
    }

    /// Snapshot of the keys in insertion order
    pub fn keys(&self) -> Vec<Value> {
        self.entries.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of the values in insertion order
    pub fn values(&self) -> Vec<Value> {
        self.entries.borrow().iter().map(|(_, v)| v.clone()).collect()
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.items().iter().all(|(key, value)| {
                matches!(other.get(key), Ok(Some(ref found)) if found == value)
            })
    }
}

/// Insertion-ordered set of hashable values
#[derive(Default)]
pub struct Set {
    members: Dict,
}

impl Set {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from values, dropping duplicates
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> ScriptResult<Self> {
        let set = Self::new();
        for value in values {
            set.insert(value)?;
        }
        Ok(set)
    }

    /// Add a member; returns whether it was newly inserted
    pub fn insert(&self, value: Value) -> ScriptResult<bool> {
        Ok(self.members.insert(value, Value::None)?.is_none())
    }

    /// Membership test
    pub fn contains(&self, value: &Value) -> ScriptResult<bool> {
        self.members.contains_key(value)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snapshot of the members in insertion order
    pub fn to_vec(&self) -> Vec<Value> {
        self.members.keys()
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .to_vec()
                .iter()
                .all(|member| matches!(other.contains(member), Ok(true)))
    }
}
