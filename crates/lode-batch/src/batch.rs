use std::path::PathBuf;
use std::str::FromStr;

use lode_core::Guid;
use lode_runtime::{BatchId, TaskResult};
use lode_storage::EntityRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of one batch.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BatchState {
    /// Nothing materialized.
    #[default]
    Unloaded,
    /// A transition was queued on the strand.
    Queued,
    /// Load in progress.
    Loading,
    /// Entities spawned, closure leased.
    Loaded,
    /// Unload in progress.
    Unloading,
    /// The last operation failed.
    Error,
}

/// Book-keeping record of one batch.
#[derive(Clone, Debug)]
pub struct BatchInfo {
    /// Batch identity.
    pub id: BatchId,
    /// Display name.
    pub name: String,
    /// Batch file name, relative to the index file's directory.
    pub filename: PathBuf,
    /// Current lifecycle state.
    pub state: BatchState,
    /// Transitive closure of asset GUIDs referenced by the live set. May
    /// over-approximate temporarily after detach or destroy.
    pub asset_closure: Vec<Guid>,
    /// Entities owned by the batch while loaded.
    pub live: Vec<EntityRef>,
    /// Outcome of the last asynchronous operation.
    pub last_result: Option<TaskResult>,
}

impl BatchInfo {
    pub(crate) fn new(id: BatchId, name: String, filename: PathBuf) -> Self {
        Self {
            id,
            name,
            filename,
            state: BatchState::default(),
            asset_closure: Vec::new(),
            live: Vec::new(),
            last_result: None,
        }
    }
}

fn guids_to_strings(guids: &[Guid]) -> Vec<String> {
    guids
        .iter()
        .filter(|guid| guid.is_valid())
        .map(Guid::to_string)
        .collect()
}

fn strings_to_guids(strings: &[String]) -> Vec<Guid> {
    strings
        .iter()
        .filter_map(|text| Guid::from_str(text).ok())
        .filter(|guid| guid.is_valid())
        .collect()
}

/// One entry of the on-disk batch index.
#[derive(Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    pub id: String,
    pub name: String,
    pub asset_closure_hdr: Vec<String>,
    pub filename: String,
}

/// On-disk form of the batch index.
#[derive(Serialize, Deserialize, Default)]
pub(crate) struct IndexFile {
    pub batches: Vec<IndexEntry>,
}

impl IndexFile {
    pub fn from_batches<'a>(batches: impl Iterator<Item = &'a BatchInfo>) -> Self {
        Self {
            batches: batches
                .map(|batch| IndexEntry {
                    id: batch.id.to_string(),
                    name: batch.name.clone(),
                    asset_closure_hdr: guids_to_strings(&batch.asset_closure),
                    filename: batch.filename.display().to_string(),
                })
                .collect(),
        }
    }

    pub fn into_batches(self) -> Vec<BatchInfo> {
        self.batches
            .into_iter()
            .filter_map(|entry| {
                let id = Guid::from_str(&entry.id).ok().filter(|id| id.is_valid())?;
                let mut info = BatchInfo::new(id, entry.name, PathBuf::from(entry.filename));
                info.asset_closure = strings_to_guids(&entry.asset_closure_hdr);
                Some(info)
            })
            .collect()
    }
}

/// Header of the on-disk batch file.
#[derive(Serialize, Deserialize)]
pub(crate) struct BatchFileHeader {
    pub id: String,
    pub name: String,
    pub asset_closure: Vec<String>,
}

/// On-disk form of one batch: header plus serialized entity descriptors.
#[derive(Serialize, Deserialize)]
pub(crate) struct BatchFile {
    pub header: BatchFileHeader,
    pub entities: Vec<Value>,
}

impl BatchFile {
    pub fn new(info: &BatchInfo, entities: Vec<Value>) -> Self {
        Self {
            header: BatchFileHeader {
                id: info.id.to_string(),
                name: info.name.clone(),
                asset_closure: guids_to_strings(&info.asset_closure),
            },
            entities,
        }
    }

    pub fn closure(&self) -> Vec<Guid> {
        strings_to_guids(&self.header.asset_closure)
    }
}
