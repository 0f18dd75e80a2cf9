use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use common::constants::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
use common::error::ApiError;
use common::schemas::{FileListing, NewFileInfo, TransferFileInfo};
use common::time_utils::utc_now_secs_f64;

use crate::core::node::NodeRegistry;

/// Catalog entry for a file. The replica set only ever grows.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FileRecord {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub owner_node: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub created_at: f64,
    pub uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub replica_nodes: BTreeSet<String>,
}

impl FileRecord {
    /// Replica nodes that are currently ACTIVE, in id order.
    pub fn online_replicas(&self, registry: &NodeRegistry) -> Vec<String> {
        self.replica_nodes
            .iter()
            .filter(|id| registry.is_active(id))
            .cloned()
            .collect()
    }

    /// `replica_count` counts only replicas that are online right now.
    pub fn to_listing(&self, registry: &NodeRegistry) -> FileListing {
        FileListing {
            file_id: self.file_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            owner_node: self.owner_node.clone(),
            replica_count: self.online_replicas(registry).len(),
            total_chunks: self.total_chunks,
            chunk_size: self.chunk_size,
            created_at: self.created_at,
        }
    }

    pub fn to_transfer_info(&self) -> TransferFileInfo {
        TransferFileInfo {
            file_id: self.file_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size,
            chunk_size: self.chunk_size,
            total_chunks: self.total_chunks,
        }
    }
}

#[derive(Debug, Default)]
pub struct FileCatalog {
    files: BTreeMap<String, FileRecord>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, info: &NewFileInfo) -> Result<&FileRecord, ApiError> {
        if info.file_id.trim().is_empty() {
            return Err(ApiError::Validation("file_id cannot be empty".into()));
        }
        if info.file_name.trim().is_empty() {
            return Err(ApiError::Validation("file_name cannot be empty".into()));
        }
        if info.owner_node.trim().is_empty() {
            return Err(ApiError::Validation("owner_node cannot be empty".into()));
        }
        if self.files.contains_key(&info.file_id) {
            return Err(ApiError::Validation(format!(
                "file {} already exists",
                info.file_id
            )));
        }

        let chunk_size = match info.chunk_size {
            None | Some(0) => DEFAULT_CHUNK_SIZE,
            Some(c) if c < MIN_CHUNK_SIZE => {
                return Err(ApiError::Validation(format!(
                    "chunk_size must be at least {MIN_CHUNK_SIZE} bytes"
                )));
            }
            Some(c) => c,
        };

        let record = FileRecord {
            file_id: info.file_id.clone(),
            file_name: info.file_name.clone(),
            file_size: info.file_size,
            owner_node: info.owner_node.clone(),
            chunk_size,
            total_chunks: info.file_size.div_ceil(chunk_size),
            created_at: utc_now_secs_f64(),
            uploaded: true,
            file_path: info.file_path.clone(),
            replica_nodes: BTreeSet::from([info.owner_node.clone()]),
        };

        Ok(self.files.entry(info.file_id.clone()).or_insert(record))
    }

    /// Adds node ids to the replica set and returns the ones that were new.
    pub fn add_replicas<I, S>(&mut self, file_id: &str, node_ids: I) -> Result<Vec<String>, ApiError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

        let mut added = Vec::new();
        for id in node_ids {
            let id = id.into();
            if record.replica_nodes.insert(id.clone()) {
                added.push(id);
            }
        }
        Ok(added)
    }

    pub fn get(&self, file_id: &str) -> Option<&FileRecord> {
        self.files.get(file_id)
    }

    pub fn online_replicas(
        &self,
        file_id: &str,
        registry: &NodeRegistry,
    ) -> Result<Vec<String>, ApiError> {
        self.get(file_id)
            .map(|f| f.online_replicas(registry))
            .ok_or_else(|| ApiError::NotFound("File not found".into()))
    }

    /// Files that can currently be fetched from at least one ACTIVE node.
    pub fn list(&self, registry: &NodeRegistry) -> Vec<FileListing> {
        self.files
            .values()
            .filter(|f| f.uploaded && !f.online_replicas(registry).is_empty())
            .map(|f| f.to_listing(registry))
            .collect()
    }

    pub fn files_with_replica(&self, node_id: &str) -> Vec<String> {
        self.files
            .values()
            .filter(|f| f.replica_nodes.contains(node_id))
            .map(|f| f.file_id.clone())
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
