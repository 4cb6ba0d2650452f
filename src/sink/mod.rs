use std::collections::HashSet;

use serde_json::Value;

use crate::dataset::{Dataset, Record};
use crate::error::Result;

pub mod profit;

pub use profit::{rank_by_profit, BondProfit};

pub const SECURITIES_BLOCK: &str = "securities";
pub const COUPONS_BLOCK: &str = "coupons";
pub const HISTORY_BLOCK: &str = "history";

/// Receiver of merged datasets produced by the fetch layer.
pub trait DatasetSink {
    fn add_data(&mut self, data: Dataset) -> Result<()>;
}

impl DatasetSink for Dataset {
    fn add_data(&mut self, data: Dataset) -> Result<()> {
        self.merge(data);
        Ok(())
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field_string(record: &Record, key: &str) -> Option<String> {
    record
        .get(key)
        .map(value_to_string)
        .filter(|value| !value.is_empty())
}

/// Group `value_key` values by `group_key`, keeping groups in first-seen order.
///
/// Records without a usable `group_key` are skipped.
pub fn group_values(records: &[Record], group_key: &str, value_key: &str) -> Vec<(String, Vec<Value>)> {
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for record in records {
        let Some(group) = field_string(record, group_key) else {
            continue;
        };
        let value = record.get(value_key).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(name, _)| *name == group) {
            Some((_, values)) => values.push(value),
            None => groups.push((group, vec![value])),
        }
    }
    groups
}

/// Distinct SECIDs of the `securities` block, in first-seen row order.
///
/// A bond traded on several boards is listed once per board.
pub fn secids(dataset: &Dataset) -> Vec<String> {
    let mut seen = HashSet::new();
    dataset
        .block(SECURITIES_BLOCK)
        .iter()
        .filter_map(|record| field_string(record, "SECID"))
        .filter(|secid| seen.insert(secid.clone()))
        .collect()
}

/// SECIDs of the `securities` block grouped by trading board.
pub fn boards_with_secids(dataset: &Dataset) -> Vec<(String, Vec<String>)> {
    group_values(dataset.block(SECURITIES_BLOCK), "BOARDID", "SECID")
        .into_iter()
        .map(|(board, values)| {
            let ids = values
                .iter()
                .map(value_to_string)
                .filter(|id| !id.is_empty())
                .collect();
            (board, ids)
        })
        .collect()
}
