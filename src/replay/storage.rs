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

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

use super::{ReplayCommands, ReplaySession};
use crate::session::{CommandSession, SessionError};
use crate::transfer::{
    download_command, ensure_not_root, find_object, list_objects, location, ObjectKind,
    StorageObject, StorageService, TransferConfig, TransferError,
};

/// [`StorageService`] driven by recorded traffic instead of a connection.
///
/// Listings, lookups and deletes replay the commands a live
/// [`CopyService`](crate::transfer::CopyService) recorded. Downloads return
/// the recorded `cat` output. Uploads are kept in memory and shadow the
/// recording for later downloads of the same path.
#[derive(Debug)]
pub struct ReplayStorage {
    replay: Arc<ReplayCommands>,
    config: TransferConfig,
    system: OnceLock<String>,
    uploads: Mutex<HashMap<String, Vec<u8>>>,
}

impl ReplayStorage {
    pub fn new(replay: Arc<ReplayCommands>) -> Self {
        Self {
            replay,
            config: TransferConfig::default(),
            system: OnceLock::new(),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Payload uploaded to `path` during playback, if any.
    pub fn uploaded(&self, path: &str) -> Option<Vec<u8>> {
        self.lock_uploads().get(path).cloned()
    }

    fn lock_uploads(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn session(&self) -> Result<(ReplaySession, String), SessionError> {
        let mut session = ReplaySession::new(Arc::clone(&self.replay));
        let system = match self.system.get() {
            Some(system) => system.clone(),
            None => {
                let system = session.system().await?;
                self.system.get_or_init(|| system).clone()
            }
        };
        Ok((session, system))
    }
}

#[async_trait]
impl StorageService for ReplayStorage {
    async fn list(&self, url: &str) -> Result<Vec<StorageObject>, TransferError> {
        let (mut session, system) = self.session().await?;
        list_objects(&mut session, url, &system, self.config.command_timeout).await
    }

    async fn object(&self, url: &str) -> Result<Option<StorageObject>, TransferError> {
        if let Some(data) = self.uploaded(location::remote_path(url)) {
            return Ok(Some(StorageObject {
                url: url.to_string(),
                kind: ObjectKind::Content,
                size: data.len() as u64,
                modified: Utc::now(),
            }));
        }
        let (mut session, system) = self.session().await?;
        find_object(&mut session, url, &system, self.config.command_timeout).await
    }

    async fn download(&self, object: &StorageObject) -> Result<Vec<u8>, TransferError> {
        let path = location::remote_path(&object.url);
        if let Some(data) = self.uploaded(path) {
            return Ok(data);
        }
        let command = download_command(path);
        if !self.replay.contains(&command) {
            return Err(TransferError::NotFound(object.url.clone()));
        }
        Ok(self.replay.next_bytes(&command))
    }

    async fn upload(&self, url: &str, data: &[u8]) -> Result<(), TransferError> {
        let path = location::remote_path(url).to_string();
        debug!("Keeping replayed upload of {} ({} bytes)", path, data.len());
        self.lock_uploads().insert(path, data.to_vec());
        Ok(())
    }

    async fn delete(&self, object: &StorageObject) -> Result<(), TransferError> {
        let path = location::remote_path(&object.url);
        ensure_not_root(path)?;
        self.lock_uploads().remove(path);
        let (mut session, _) = self.session().await?;
        session
            .run(
                &format!("rm -rf {}", location::shell_quote(path)),
                &[],
                self.config.command_timeout,
            )
            .await?;
        Ok(())
    }
}
