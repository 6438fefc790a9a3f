//! Local evaluation of `find` queries against stored records.
//!
//! Supports top-level equality plus a small set of comparison operators per
//! field. Whitelisted `$` operators are accepted and left to the server;
//! keys listed in `paramsForServer` are dropped before matching.

use crate::error::{StoreError, StoreResult};
use entcache_record::Record;
use serde_json::{Map, Value};
use std::cmp::Ordering;

const FIELD_OPERATORS: [&str; 7] = ["$in", "$nin", "$ne", "$lt", "$lte", "$gt", "$gte"];

/// A parsed local query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Map<String, Value>,
    whitelist: Vec<String>,
}

impl Query {
    /// Extracts the `query` object from find `params`.
    pub fn from_params(
        params: &Value,
        params_for_server: &[String],
        whitelist: &[String],
    ) -> StoreResult<Self> {
        let filters = match params.get("query") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(StoreError::InvalidQuery(format!(
                    "query must be an object, got {other}"
                )));
            }
        };
        let mut filters: Map<String, Value> = filters
            .into_iter()
            .filter(|(key, _)| !params_for_server.contains(key))
            .collect();

        let unknown = filters
            .keys()
            .find(|key| key.starts_with('$') && !whitelist.contains(key))
            .cloned();
        if let Some(key) = unknown {
            return Err(StoreError::InvalidQuery(format!("operator {key} is not whitelisted")));
        }
        filters.retain(|key, _| !key.starts_with('$'));

        Ok(Self {
            filters,
            whitelist: whitelist.to_vec(),
        })
    }

    pub fn matches(&self, record: &Record) -> StoreResult<bool> {
        for (field, expected) in &self.filters {
            let actual = record.get(field).unwrap_or(Value::Null);
            if !self.field_matches(&actual, expected)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn field_matches(&self, actual: &Value, expected: &Value) -> StoreResult<bool> {
        let Value::Object(ops) = expected else {
            return Ok(actual == expected);
        };
        if !ops.keys().any(|k| k.starts_with('$')) {
            return Ok(actual == expected);
        }
        for (op, operand) in ops {
            let ok = match op.as_str() {
                "$in" => as_list(op, operand)?.contains(actual),
                "$nin" => !as_list(op, operand)?.contains(actual),
                "$ne" => actual != operand,
                "$lt" => compare(actual, operand) == Some(Ordering::Less),
                "$lte" => matches!(compare(actual, operand), Some(Ordering::Less | Ordering::Equal)),
                "$gt" => compare(actual, operand) == Some(Ordering::Greater),
                "$gte" => matches!(
                    compare(actual, operand),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                other if self.whitelist.iter().any(|w| w == other) => true,
                other => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unsupported operator {other}, expected one of {FIELD_OPERATORS:?}"
                    )));
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn as_list<'a>(op: &str, operand: &'a Value) -> StoreResult<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} expects an array")))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
