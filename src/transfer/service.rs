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
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::list::{find_object, list_objects};
use super::location::{self, shell_quote};
use super::{
    download_command, ensure_not_root, scp, upload_record_key, StorageObject, StorageService,
    TransferConfig, TransferError,
};
use crate::replay::{ReplayCommands, Replayable};
use crate::session::{CommandSession, SessionConfig, ShellSession};
use crate::ssh::{collect_output, exec_command, ChannelOpener, ShellRequest};

/// Attempts made for a transfer that fails size verification.
const VERIFY_ATTEMPTS: u32 = 2;

/// [`StorageService`] backed by a live SSH connection.
///
/// Every operation opens its own shell session and closes it before
/// returning. The remote kernel name is queried once and cached.
pub struct CopyService {
    opener: Arc<dyn ChannelOpener>,
    shell: ShellRequest,
    session_config: SessionConfig,
    config: TransferConfig,
    system: OnceLock<String>,
    replay: Option<Arc<ReplayCommands>>,
}

impl CopyService {
    pub fn new(opener: Arc<dyn ChannelOpener>) -> Self {
        Self {
            opener,
            shell: ShellRequest::default(),
            session_config: SessionConfig::default(),
            config: TransferConfig::default(),
            system: OnceLock::new(),
            replay: None,
        }
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_shell(mut self, shell: ShellRequest) -> Self {
        self.shell = shell;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    async fn open_session(&self) -> Result<ShellSession, TransferError> {
        let mut session =
            ShellSession::open(self.opener.as_ref(), &self.shell, self.session_config).await?;
        if let Some(replay) = &self.replay {
            session.set_replay(Some(Arc::clone(replay)));
        }
        Ok(session)
    }

    async fn system(&self, session: &mut ShellSession) -> Result<String, TransferError> {
        if let Some(system) = self.system.get() {
            return Ok(system.clone());
        }
        let system = session.system().await?;
        debug!("Remote system is {:?}", system);
        Ok(self.system.get_or_init(|| system).clone())
    }

    async fn run_command(&self, command: &str) -> Result<String, TransferError> {
        let mut session = self.open_session().await?;
        let result = session
            .run(command, &[], self.config.command_timeout)
            .await
            .map_err(TransferError::from);
        session.close().await;
        result
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransferError> {
        let command = download_command(location::remote_path(url));
        let output = exec_command(self.opener.as_ref(), &command).await?;
        if output.stdout.is_empty() && !output.stderr.is_empty() {
            return Err(TransferError::Remote(output.stderr_text()));
        }
        if let Some(replay) = &self.replay {
            replay.register(&command, &output.stdout);
        }
        Ok(output.stdout)
    }

    async fn send(&self, directory: &str, name: &str, data: &[u8]) -> Result<(), TransferError> {
        let mut streams = self.opener.open_exec(&scp::sink_command(directory)).await?;
        let sent = scp::send_file(
            &mut streams.stdin,
            name,
            data,
            self.config.chunk_size,
            self.config.chunk_pause,
        )
        .await;
        if let Err(e) = streams.stdin.shutdown().await {
            debug!("Failed to close scp input: {}", e);
        }

        // A sink that gave up early explains itself on stdout.
        let output = collect_output(&mut streams.stdout, &mut streams.stderr).await?;
        scp::check_status(&output.stdout, &output.stderr)?;
        sent?;
        Ok(())
    }

    fn needs_verification(&self, expected: u64, actual: usize) -> bool {
        let threshold = self.config.verify_threshold;
        actual > threshold || expected > threshold as u64
    }
}

#[async_trait]
impl StorageService for CopyService {
    async fn list(&self, url: &str) -> Result<Vec<StorageObject>, TransferError> {
        let mut session = self.open_session().await?;
        let result = async {
            let system = self.system(&mut session).await?;
            list_objects(&mut session, url, &system, self.config.command_timeout).await
        }
        .await;
        session.close().await;
        result
    }

    async fn object(&self, url: &str) -> Result<Option<StorageObject>, TransferError> {
        let mut session = self.open_session().await?;
        let result = async {
            let system = self.system(&mut session).await?;
            find_object(&mut session, url, &system, self.config.command_timeout).await
        }
        .await;
        session.close().await;
        result
    }

    async fn download(&self, object: &StorageObject) -> Result<Vec<u8>, TransferError> {
        let mut expected = object.size;
        let mut attempt = 1;
        loop {
            let data = self.fetch(&object.url).await?;
            let actual = data.len();
            if !self.needs_verification(expected, actual) || actual as u64 == expected {
                debug!("Downloaded {} ({} bytes)", object.url, actual);
                return Ok(data);
            }
            if attempt >= VERIFY_ATTEMPTS {
                return Err(TransferError::SizeMismatch {
                    url: object.url.clone(),
                    operation: "download",
                    expected,
                    actual: actual as u64,
                });
            }
            warn!(
                "Download of {} returned {} bytes, expected {}; retrying",
                object.url, actual, expected
            );
            if let Some(current) = self.object(&object.url).await? {
                expected = current.size;
            }
            attempt += 1;
        }
    }

    async fn upload(&self, url: &str, data: &[u8]) -> Result<(), TransferError> {
        let path = location::remote_path(url);
        let (parent, name) = location::split(path);
        if name.is_empty() {
            return Err(TransferError::Remote(format!("{url} does not name a file")));
        }
        let parent = if parent.is_empty() { ".".to_string() } else { parent };
        // Refuse names the sink header cannot carry before touching the host.
        scp::header(name, data.len())?;

        self.run_command(&format!("mkdir -p {}", shell_quote(&parent)))
            .await?;

        let expected = data.len() as u64;
        let mut attempt = 1;
        loop {
            self.send(&parent, name, data).await?;
            if !self.needs_verification(expected, data.len()) {
                break;
            }
            let actual = self.object(url).await?.map(|object| object.size);
            if actual == Some(expected) {
                break;
            }
            let actual = actual.unwrap_or(0);
            if attempt >= VERIFY_ATTEMPTS {
                return Err(TransferError::SizeMismatch {
                    url: url.to_string(),
                    operation: "upload",
                    expected,
                    actual,
                });
            }
            warn!(
                "Upload of {} left {} bytes on the host, expected {}; retrying",
                url, actual, expected
            );
            attempt += 1;
        }

        if let Some(replay) = &self.replay {
            replay.register(&upload_record_key(path), data);
        }
        info!("Uploaded {} ({} bytes)", url, expected);
        Ok(())
    }

    async fn delete(&self, object: &StorageObject) -> Result<(), TransferError> {
        let path = location::remote_path(&object.url);
        ensure_not_root(path)?;
        self.run_command(&format!("rm -rf {}", shell_quote(path)))
            .await?;
        info!("Deleted {}", object.url);
        Ok(())
    }
}

impl Replayable for CopyService {
    fn set_replay(&mut self, replay: Option<Arc<ReplayCommands>>) {
        self.replay = replay;
    }
}
