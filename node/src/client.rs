use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use common::error::{ApiError, ErrorKind};
use common::schemas::{
    DownloadRequest, FileCreatedRequest, FileListing, HeartbeatRequest, ListFilesRequest,
    NewFileInfo, NodeResources, RegisterRequest, Reply, Request, TransferCompleteRequest,
    TransferFileInfo, TransferParams,
};
use common::wire::{read_message, write_message};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("cannot reach coordinator at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("coordinator did not answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("coordinator rejected request: {message}")]
    Rejected {
        kind: Option<ErrorKind>,
        message: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ClientError {
    fn from_wire(e: ApiError) -> Self {
        match e {
            ApiError::Io(e) => ClientError::Io(e),
            other => ClientError::Malformed(other.to_string()),
        }
    }

    /// Error class reported by the coordinator, if it answered at all.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Rejected { kind, .. } => *kind,
            _ => None,
        }
    }
}

/// Everything a node needs to start pulling a file.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPlan {
    pub source_node: String,
    pub source_host: String,
    pub file_info: TransferFileInfo,
    pub params: TransferParams,
}

/// Speaks the one-message-per-connection protocol. Each call opens a fresh
/// connection and is bounded by `timeout` end to end.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one request and returns whatever the coordinator replied, ERROR included.
    pub async fn send(&self, req: &Request) -> Result<Reply, ClientError> {
        let exchange = async {
            let mut stream = TcpStream::connect(self.addr)
                .await
                .map_err(|source| ClientError::Connect {
                    addr: self.addr,
                    source,
                })?;
            write_message(&mut stream, req)
                .await
                .map_err(ClientError::from_wire)?;
            stream.shutdown().await?;
            read_message::<Reply, _>(&mut stream)
                .await
                .map_err(ClientError::from_wire)
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }

    /// Like [`send`](Self::send) but turns ERROR replies into [`ClientError::Rejected`].
    pub async fn call(&self, req: &Request) -> Result<Reply, ClientError> {
        let reply = self.send(req).await?;
        if reply.is_error() {
            return Err(ClientError::Rejected {
                kind: reply.kind,
                message: reply.error_message().to_string(),
            });
        }
        Ok(reply)
    }

    pub async fn register(
        &self,
        node_id: &str,
        host: &str,
        port: u16,
        resources: NodeResources,
    ) -> Result<Reply, ClientError> {
        self.call(&Request::Register(RegisterRequest {
            node_id: node_id.to_string(),
            host: host.to_string(),
            port,
            resources: resources.into(),
        }))
        .await
    }

    pub async fn heartbeat(&self, node_id: &str) -> Result<(), ClientError> {
        self.call(&Request::Heartbeat(HeartbeatRequest {
            node_id: node_id.to_string(),
        }))
        .await
        .map(|_| ())
    }

    pub async fn file_created(
        &self,
        node_id: &str,
        file_info: NewFileInfo,
    ) -> Result<Reply, ClientError> {
        self.call(&Request::FileCreated(FileCreatedRequest {
            node_id: node_id.to_string(),
            file_info,
        }))
        .await
    }

    pub async fn list_files(&self, node_id: &str) -> Result<Vec<FileListing>, ClientError> {
        let reply = self
            .call(&Request::ListFiles(ListFilesRequest {
                node_id: node_id.to_string(),
            }))
            .await?;
        Ok(reply.files.unwrap_or_default())
    }

    pub async fn download_request(
        &self,
        node_id: &str,
        file_id: &str,
    ) -> Result<DownloadPlan, ClientError> {
        let reply = self
            .call(&Request::DownloadRequest(DownloadRequest {
                node_id: node_id.to_string(),
                file_id: file_id.to_string(),
            }))
            .await?;

        let missing = |field: &str| ClientError::Malformed(format!("download reply lacks {field}"));
        Ok(DownloadPlan {
            source_node: reply.source_node.ok_or_else(|| missing("source_node"))?,
            source_host: reply.source_host.unwrap_or_else(|| "localhost".to_string()),
            file_info: reply.file_info.ok_or_else(|| missing("file_info"))?,
            params: reply.transfer_params.ok_or_else(|| missing("transfer_params"))?,
        })
    }

    pub async fn transfer_complete(&self, req: TransferCompleteRequest) -> Result<(), ClientError> {
        self.call(&Request::TransferComplete(req)).await.map(|_| ())
    }
}
