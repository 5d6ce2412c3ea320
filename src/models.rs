// Core data structures for the gather harvester

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Identifier of a requested record
///
/// JSON numbers and strings normalise to the same textual form, so `42`
/// and `"42"` name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from a JSON scalar; objects, arrays, null and empty strings yield `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Field names used to read listing and detail objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Field holding the record id (in listing and detail objects)
    pub id_field: String,

    /// Field holding the detail reference path (listing objects only)
    pub reference_field: String,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self {
            id_field: String::from("numero"),
            reference_field: String::from("resource_uri"),
        }
    }
}

impl RecordSchema {
    /// Extract the id of a JSON object
    pub fn id_of(&self, object: &Value) -> Option<RecordId> {
        object.get(&self.id_field).and_then(RecordId::from_value)
    }

    /// Extract the detail reference of a listing object
    pub fn reference_of(&self, object: &Value) -> Option<String> {
        object
            .get(&self.reference_field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Summary entry produced by the page collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: RecordId,
    pub detail_reference: String,
}

impl ListingRecord {
    pub fn new(id: impl Into<RecordId>, detail_reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            detail_reference: detail_reference.into(),
        }
    }

    /// Read a listing object through the schema; `None` if a field is missing
    pub fn from_value(object: &Value, schema: &RecordSchema) -> Option<Self> {
        Some(Self {
            id: schema.id_of(object)?,
            detail_reference: schema.reference_of(object)?,
        })
    }
}

/// Ordered, bounded slice of listing records processed in one fetch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position of the block in the plan (0-based)
    pub index: usize,
    pub records: Vec<ListingRecord>,
}

impl Block {
    pub fn new(index: usize, records: Vec<ListingRecord>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of the block members, in block order
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.iter().map(|r| &r.id)
    }
}

/// Full fetched payload of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: RecordId,
    pub payload: Value,
}

impl DetailRecord {
    pub fn new(id: RecordId, payload: Value) -> Self {
        Self { id, payload }
    }

    /// Rebuild a record from a stored payload, reading its id through the schema
    pub fn from_payload(payload: Value, schema: &RecordSchema) -> Option<Self> {
        let id = schema.id_of(&payload)?;
        Some(Self { id, payload })
    }
}

/// Per-id status of one fetch call
#[derive(Debug, Clone)]
pub enum FetchStatus {
    Success(DetailRecord),
    Failure(String),
}

/// Result of fetching one id, including how many attempts it took
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub id: RecordId,
    pub status: FetchStatus,
    pub attempts: u32,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success(_))
    }
}

/// Counts from merging a batch of details into the collection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Ids obtained for the first time
    pub inserted: usize,
    /// Ids that already had a record and were overwritten
    pub replaced: usize,
    /// Records whose id was never requested
    pub ignored: usize,
}

/// Reconciliation state owned by the reconciler
///
/// `obtained` holds at most one record per id. Merging a record for an id
/// that is already present replaces it: the last successful fetch wins.
#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    pub requested: HashSet<RecordId>,
    pub obtained: HashMap<RecordId, DetailRecord>,
    pub round: u32,
}

impl CollectionState {
    pub fn new<'a>(requested: impl IntoIterator<Item = &'a RecordId>) -> Self {
        Self {
            requested: requested.into_iter().cloned().collect(),
            obtained: HashMap::new(),
            round: 0,
        }
    }

    /// Merge fetched details; records for ids outside `requested` are dropped
    pub fn merge(&mut self, details: impl IntoIterator<Item = DetailRecord>) -> MergeStats {
        let mut stats = MergeStats::default();
        for detail in details {
            if !self.requested.contains(&detail.id) {
                stats.ignored += 1;
                continue;
            }
            match self.obtained.insert(detail.id.clone(), detail) {
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
        }
        stats
    }

    /// `requested − keys(obtained)`, sorted
    pub fn missing(&self) -> BTreeSet<RecordId> {
        self.requested
            .iter()
            .filter(|id| !self.obtained.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.requested
            .iter()
            .all(|id| self.obtained.contains_key(id))
    }

    /// Obtained records in the order of the given listing
    pub fn ordered_details(&self, summary: &[ListingRecord]) -> Vec<DetailRecord> {
        summary
            .iter()
            .filter_map(|record| self.obtained.get(&record.id).cloned())
            .collect()
    }
}
