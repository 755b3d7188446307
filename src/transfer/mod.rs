// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! File listing, upload, download and delete over shell sessions.
//!
//! [`CopyService`] talks to a live host: listings and deletes go through a
//! [`ShellSession`](crate::session::ShellSession), uploads speak the scp sink
//! protocol on an exec channel, downloads `cat` the file on an exec channel.
//! [`ReplayStorage`](crate::replay::ReplayStorage) implements the same
//! [`StorageService`] trait from recorded traffic.

mod list;
pub mod location;
pub mod scp;
mod service;

pub use list::{find_object, list_command, list_objects};
pub use service::CopyService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::listing::{FileEntry, ListingError};
use crate::session::SessionError;

/// Payload bytes written per chunk during an upload.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Pause between upload chunks; large single writes were seen to truncate.
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(10);

/// Transfers larger than this are size-checked after completion.
pub const DEFAULT_VERIFY_THRESHOLD: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("channel error: {0}")]
    Channel(#[from] crate::ssh::tokio_client::Error),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error("refusing to delete the filesystem root ({0})")]
    RootDelete(String),

    #[error("{url}: {operation} size mismatch, expected {expected} bytes but found {actual}")]
    SizeMismatch {
        url: String,
        operation: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("scp rejected the upload: {0}")]
    Scp(String),

    #[error("remote command failed: {0}")]
    Remote(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tuning of uploads, downloads and the commands behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
    pub verify_threshold: usize,
    pub command_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_pause: DEFAULT_CHUNK_PAUSE,
            verify_threshold: DEFAULT_VERIFY_THRESHOLD,
            command_timeout: crate::session::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Folder,
    Content,
}

/// A listed remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub url: String,
    pub kind: ObjectKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl StorageObject {
    pub fn is_folder(&self) -> bool {
        self.kind == ObjectKind::Folder
    }

    pub fn name(&self) -> &str {
        location::file_name(&self.url)
    }
}

impl From<FileEntry> for StorageObject {
    fn from(entry: FileEntry) -> Self {
        Self {
            url: entry.url,
            kind: if entry.is_dir {
                ObjectKind::Folder
            } else {
                ObjectKind::Content
            },
            size: entry.size,
            modified: entry.modified,
        }
    }
}

/// Storage operations addressed by URL (`scp://host[:port]/path`) or plain path.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn list(&self, url: &str) -> Result<Vec<StorageObject>, TransferError>;

    /// The object at `url` itself, or `None` when nothing is there.
    async fn object(&self, url: &str) -> Result<Option<StorageObject>, TransferError>;

    async fn exists(&self, url: &str) -> Result<bool, TransferError> {
        Ok(self.object(url).await?.is_some())
    }

    async fn download(&self, object: &StorageObject) -> Result<Vec<u8>, TransferError>;

    async fn upload(&self, url: &str, data: &[u8]) -> Result<(), TransferError>;

    async fn delete(&self, object: &StorageObject) -> Result<(), TransferError>;
}

/// Command whose output is the file content; also the replay key of downloads.
pub fn download_command(path: &str) -> String {
    format!("cat {}", location::shell_quote(path))
}

/// Replay key under which uploaded payloads are recorded.
pub fn upload_record_key(path: &str) -> String {
    format!("upload {path}")
}

/// Refuse deleting `/` (or any spelling of it).
pub fn ensure_not_root(path: &str) -> Result<(), TransferError> {
    if path.trim_end_matches('/').is_empty() {
        return Err(TransferError::RootDelete(path.to_string()));
    }
    Ok(())
}
