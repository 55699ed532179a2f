//! Sparse bucket→count table stored as a single scalar column.
//!
//! The storage form is `key,count|key,count|...`. Keys are written in ascending
//! order but the parser accepts any order. An empty string is an empty table.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const ENTRY_SEPARATOR: char = '|';
const KV_SEPARATOR: char = ',';

/// Sparse table of non-negative integer keys to non-negative counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    data: BTreeMap<u64, i64>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for `key`, zero when absent.
    pub fn get(&self, key: u64) -> i64 {
        self.data.get(&key).copied().unwrap_or(0)
    }

    pub fn put(&mut self, key: u64, value: i64) {
        self.data.insert(key, value);
    }

    /// Adds `delta` to the count stored under `key`.
    pub fn increment(&mut self, key: u64, delta: i64) {
        let count = self.data.entry(key).or_insert(0);
        *count = count.saturating_add(delta);
    }

    /// Sums every bucket of `other` into this table.
    pub fn append(&mut self, other: &DataTable) {
        for (key, value) in &other.data {
            self.increment(*key, *value);
        }
    }

    pub fn sum_of_values(&self) -> i64 {
        self.data.values().fold(0i64, |sum, value| sum.saturating_add(*value))
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.data.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, i64)> + '_ {
        self.data.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Encodes the table into its storage scalar.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 8);
        for (i, (key, value)) in self.data.iter().enumerate() {
            if i > 0 {
                out.push(ENTRY_SEPARATOR);
            }
            out.push_str(&key.to_string());
            out.push(KV_SEPARATOR);
            out.push_str(&value.to_string());
        }
        out
    }

    /// Decodes a storage scalar. `None` and empty input yield an empty table.
    pub fn decode(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::new()),
            Some(raw) => raw,
        };

        let mut data = BTreeMap::new();
        for entry in raw.split(ENTRY_SEPARATOR) {
            let (key, value) = entry.split_once(KV_SEPARATOR).ok_or_else(|| {
                Error::Decode(format!("histogram entry '{}' has no '{}'", entry, KV_SEPARATOR))
            })?;
            let key: u64 = key.trim().parse().map_err(|_| {
                Error::Decode(format!("histogram key '{}' is not a non-negative integer", key))
            })?;
            let value: i64 = value.trim().parse().map_err(|_| {
                Error::Decode(format!("histogram count '{}' is not an integer", value))
            })?;
            if value < 0 {
                return Err(Error::Decode(format!(
                    "histogram count {} for key {} is negative",
                    value, key
                )));
            }
            if data.insert(key, value).is_some() {
                return Err(Error::Decode(format!("histogram key {} appears twice", key)));
            }
        }
        Ok(Self { data })
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for DataTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(Some(s))
    }
}

impl FromIterator<(u64, i64)> for DataTable {
    fn from_iter<I: IntoIterator<Item = (u64, i64)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl Serialize for DataTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for DataTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DataTable::decode(Some(&raw)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let table: DataTable = [(0, 3), (7, 1), (12, 40), (3, 9)].into_iter().collect();
        let encoded = table.encode();
        assert_eq!(encoded, "0,3|3,9|7,1|12,40");
        assert_eq!(DataTable::decode(Some(&encoded)).unwrap(), table);
    }

    #[test]
    fn test_decode_unsorted_input() {
        let table = DataTable::decode(Some("9,2|1,5|4,0")).unwrap();
        assert_eq!(table.get(1), 5);
        assert_eq!(table.get(4), 0);
        assert_eq!(table.get(9), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec![1, 4, 9]);
    }

    #[test]
    fn test_decode_empty_and_absent() {
        assert!(DataTable::decode(None).unwrap().is_empty());
        assert!(DataTable::decode(Some("")).unwrap().is_empty());
        assert_eq!(DataTable::new().encode(), "");
    }

    #[test]
    fn test_absent_bucket_is_zero() {
        let table = DataTable::decode(Some("2,8")).unwrap();
        assert_eq!(table.get(3), 0);
    }

    #[test]
    fn test_decode_malformed() {
        for raw in ["1", "a,2", "1,b", "-1,2", "1,-2", "1,2|1,3", "1,2|"] {
            assert!(
                matches!(DataTable::decode(Some(raw)), Err(Error::Decode(_))),
                "expected decode failure for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_append_sums_buckets() {
        let mut left: DataTable = [(1, 2), (2, 3)].into_iter().collect();
        let right: DataTable = [(2, 4), (5, 1)].into_iter().collect();
        left.append(&right);
        assert_eq!(left.encode(), "1,2|2,7|5,1");
        assert_eq!(left.sum_of_values(), 10);
    }

    #[test]
    fn test_serde_as_string() {
        let table: DataTable = [(1, 1), (2, 2)].into_iter().collect();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, "\"1,1|2,2\"");
        let back: DataTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
