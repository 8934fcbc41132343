//! Stored records.
//!
//! Every record has a natural key; the store enforces its uniqueness. Reprocessing a height
//! finds the existing record and merges the recomputed fields into it with [Record::update].

mod aggregate;
mod report;
mod sequence;
mod syncable;
mod system_event;

pub use aggregate::ValidatorAgg;
pub use report::{Report, ReportKind};
pub use sequence::{
    AccountEraSeq, BlockSeq, EventSeq, TransactionSeq, ValidatorEraSeq, ValidatorSeq,
    ValidatorSessionSeq,
};
pub use syncable::{SyncStatus, Syncable};
pub use system_event::{SystemEvent, SystemEventKind};

use index_pipeline::TaskError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A computed record that failed its own invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{record} {key}: {reason}")]
pub struct ValidationError {
    pub record: &'static str,
    pub key: String,
    pub reason: String,
}

impl From<ValidationError> for TaskError {
    fn from(e: ValidationError) -> Self {
        TaskError::Validation(e.to_string())
    }
}

/// Keyed record persisted in its own table.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;

    fn natural_key(&self) -> String;

    /// Height the record was computed at.
    fn height(&self) -> u64;

    /// Secondary classifier used by kind-filtered queries.
    fn kind(&self) -> Option<String> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Merge the recomputed fields of `other` into `self`, keeping identity and
    /// first-seen fields.
    fn update(&mut self, other: &Self);

    fn invalid(&self, reason: impl Into<String>) -> ValidationError {
        ValidationError {
            record: Self::TABLE,
            key: self.natural_key(),
            reason: reason.into(),
        }
    }
}

/// Records a task computed for one height, split by whether they already existed.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes<T> {
    pub new: Vec<T>,
    pub updated: Vec<T>,
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Self {
            new: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.updated.len()
    }

    /// New and updated records together.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.new.iter().chain(self.updated.iter())
    }
}
