use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

/// One normalized row: upper-cased column name to value.
pub type Record = BTreeMap<String, Value>;

/// Records accumulated per block name across one or more fetches.
///
/// Row order inside a block is the order the rows were received and merged in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    blocks: HashMap<String, Vec<Record>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to a block, creating it when absent.
    ///
    /// Returns the number of records appended.
    pub fn extend_block<I>(&mut self, name: &str, records: I) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let rows = self.blocks.entry(name.to_string()).or_default();
        let before = rows.len();
        rows.extend(records);
        rows.len() - before
    }

    /// Concatenate `other` onto `self`, block by block.
    pub fn merge(&mut self, other: Dataset) {
        for (name, records) in other.blocks {
            match self.blocks.get_mut(&name) {
                Some(existing) => existing.extend(records),
                None => {
                    self.blocks.insert(name, records);
                }
            }
        }
    }

    pub fn merged(mut self, other: Dataset) -> Self {
        self.merge(other);
        self
    }

    pub fn block(&self, name: &str) -> &[Record] {
        self.blocks.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn total_records(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
