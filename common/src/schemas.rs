use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorKind};

/// Every message a node may send to the coordinator, tagged by `action`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Register(RegisterRequest),
    Heartbeat(HeartbeatRequest),
    FileCreated(FileCreatedRequest),
    ListFiles(ListFilesRequest),
    DownloadRequest(DownloadRequest),
    UploadRequest(UploadRequest),
    TransferComplete(TransferCompleteRequest),
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Register(_) => "REGISTER",
            Request::Heartbeat(_) => "HEARTBEAT",
            Request::FileCreated(_) => "FILE_CREATED",
            Request::ListFiles(_) => "LIST_FILES",
            Request::DownloadRequest(_) => "DOWNLOAD_REQUEST",
            Request::UploadRequest(_) => "UPLOAD_REQUEST",
            Request::TransferComplete(_) => "TRANSFER_COMPLETE",
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Request::Register(r) => &r.node_id,
            Request::Heartbeat(r) => &r.node_id,
            Request::FileCreated(r) => &r.node_id,
            Request::ListFiles(r) => &r.node_id,
            Request::DownloadRequest(r) => &r.node_id,
            Request::UploadRequest(r) => &r.node_id,
            Request::TransferComplete(r) => &r.node_id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub node_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub resources: ResourceSpec,
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Resources as they arrive on the wire; any field may be missing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_gb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_mbps: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeResources {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub storage_gb: u64,
    pub bandwidth_mbps: u32,
}

impl ResourceSpec {
    pub fn validate(&self) -> Result<NodeResources, ApiError> {
        fn required<T: Copy>(v: Option<T>, name: &str) -> Result<T, ApiError> {
            v.ok_or_else(|| ApiError::Validation(format!("missing required resource: {name}")))
        }

        Ok(NodeResources {
            cpu_cores: required(self.cpu_cores, "cpu_cores")?,
            memory_gb: required(self.memory_gb, "memory_gb")?,
            storage_gb: required(self.storage_gb, "storage_gb")?,
            bandwidth_mbps: required(self.bandwidth_mbps, "bandwidth_mbps")?,
        })
    }
}

impl From<NodeResources> for ResourceSpec {
    fn from(r: NodeResources) -> Self {
        Self {
            cpu_cores: Some(r.cpu_cores),
            memory_gb: Some(r.memory_gb),
            storage_gb: Some(r.storage_gb),
            bandwidth_mbps: Some(r.bandwidth_mbps),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeartbeatRequest {
    pub node_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileCreatedRequest {
    pub node_id: String,
    pub file_info: NewFileInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewFileInfo {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub owner_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListFilesRequest {
    pub node_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub node_id: String,
    pub file_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferCompleteRequest {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

fn default_success() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Download,
    Upload,
    Replication,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplyStatus {
    #[default]
    Ok,
    Ack,
    Error,
}

/// The single reply record; which optional fields are present depends on the action.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileListing>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<TransferFileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_params: Option<TransferParams>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn ack() -> Self {
        Self {
            status: ReplyStatus::Ack,
            ..Default::default()
        }
    }

    pub fn ack_with(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ack,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: ReplyStatus::Error,
            error: Some(err.to_string()),
            kind: Some(err.kind()),
            ..Default::default()
        }
    }

    pub fn files(files: Vec<FileListing>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            total_files: Some(files.len()),
            files: Some(files),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ReplyStatus::Error
    }

    /// Error text of an ERROR reply, or a placeholder when the coordinator sent none.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileListing {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub owner_node: String,
    pub replica_count: usize,
    pub total_chunks: u64,
    pub chunk_size: u64,
    pub created_at: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferFileInfo {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TransferParams {
    pub bandwidth_mbps: u32,
    /// Seconds.
    pub estimated_time: f64,
}
