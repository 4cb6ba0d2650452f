use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::dataset::Record;
use crate::error::{AppError, Result};

/// One named columnar table as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Block {
    #[serde(default, deserialize_with = "upper_columns")]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Option<Vec<Value>>>,
}

impl Block {
    pub fn new<C, S>(columns: C, data: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().to_uppercase())
                .collect(),
            data: data.into_iter().map(Some).collect(),
        }
    }
}

fn upper_columns<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let columns: Vec<String> = null_as_default(deserializer)?;
    Ok(columns.into_iter().map(|c| c.to_uppercase()).collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Zip every row against the block's columns.
///
/// A row whose length differs from the column count is rejected rather than
/// truncated or padded. Null rows are skipped.
pub fn normalize(name: &str, block: &Block) -> Result<Vec<Record>> {
    if block.columns.is_empty() || block.data.is_empty() {
        return Ok(Vec::new());
    }

    let expected = block.columns.len();
    let mut records: Vec<Record> = Vec::with_capacity(block.data.len());
    for (index, row) in block.data.iter().enumerate() {
        let Some(row) = row else {
            continue;
        };
        if row.len() != expected {
            return Err(AppError::MalformedBlock {
                block: name.to_string(),
                row: index,
                expected,
                actual: row.len(),
            });
        }
        records.push(
            block
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        );
    }
    Ok(records)
}

/// Read the recognised blocks of a decoded response body.
///
/// Columnar objects are normalized; arrays of objects pass through verbatim as
/// records. Blocks not listed in `known`, and values of any other
/// shape, are ignored.
pub fn parse_response(body: &Value, known: &[String]) -> Result<Vec<(String, Vec<Record>)>> {
    let Some(object) = body.as_object() else {
        warn!("ISS response is not a JSON object; treating it as empty");
        return Ok(Vec::new());
    };

    let mut blocks = Vec::new();
    for (name, value) in object {
        if !known.iter().any(|k| k == name) {
            debug!("ignoring unrecognised block `{name}`");
            continue;
        }

        match value {
            Value::Object(_) => {
                let block: Block = match serde_json::from_value(value.clone()) {
                    Ok(block) => block,
                    Err(err) => {
                        warn!("block `{name}` is not columnar ({err}); skipping it");
                        continue;
                    }
                };
                blocks.push((name.clone(), normalize(name, &block)?));
            }
            Value::Array(items) => {
                let records: Vec<Record> = items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|object| object.clone().into_iter().collect())
                    .collect();
                blocks.push((name.clone(), records));
            }
            _ => debug!("block `{name}` has an unsupported shape; skipping it"),
        }
    }
    Ok(blocks)
}
