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

//! Live shell session driven through prompt detection.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::terminator::{has_terminator, Terminator};
use super::{CommandSession, SessionConfig, SessionError};
use crate::replay::{ReplayCommands, Replayable};
use crate::ssh::{BoxedReader, BoxedWriter, ChannelOpener, ChannelStreams, ShellRequest};

/// Bytes pulled from a stream per read.
const READ_CHUNK_SIZE: usize = 8192;

/// An interactive shell turned into a command/response API.
///
/// Commands on one session are strictly sequential: `run` takes `&mut self`
/// and there is no way to attribute interleaved output to overlapping
/// commands.
pub struct ShellSession {
    prompt: String,
    config: SessionConfig,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    stdin: Option<BoxedWriter>,
    stdout_rx: mpsc::UnboundedReceiver<String>,
    stderr_rx: mpsc::UnboundedReceiver<String>,
    drain_tasks: Vec<JoinHandle<()>>,
    replay: Option<Arc<ReplayCommands>>,
    system: Option<String>,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("prompt", &self.prompt)
            .field("running", &self.is_running())
            .field("recording", &self.replay.is_some())
            .finish()
    }
}

impl ShellSession {
    /// Open a shell channel and learn its prompt.
    pub async fn open(
        opener: &dyn ChannelOpener,
        request: &ShellRequest,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let streams = opener.open_shell(request).await?;
        Self::from_streams(streams, config).await
    }

    /// Build a session on already opened shell streams and learn the prompt.
    pub async fn from_streams(
        streams: ChannelStreams,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let running = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let drain_tasks = vec![
            spawn_drain(
                "stdout",
                streams.stdout,
                stdout_tx,
                Arc::clone(&running),
                cancel.clone(),
            ),
            spawn_drain(
                "stderr",
                streams.stderr,
                stderr_tx,
                Arc::clone(&running),
                cancel.clone(),
            ),
        ];

        let mut session = Self {
            prompt: String::new(),
            config,
            running,
            cancel,
            stdin: Some(streams.stdin),
            stdout_rx,
            stderr_rx,
            drain_tasks,
            replay: None,
            system: None,
        };

        if let Err(e) = session.handshake().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Wait out the startup banner, then provoke a bare prompt and keep it.
    async fn handshake(&mut self) -> Result<(), SessionError> {
        let timeout = self.config.handshake_timeout;
        let (banner, banner_err) = self.collect(&[], timeout, None).await;
        trace!("Shell startup output: {:?}", banner);
        if !banner_err.is_empty() {
            debug!("Shell startup wrote to stderr: {}", banner_err.trim());
        }
        if !self.is_running() {
            return Err(SessionError::Closed);
        }

        let reply = self.run("", &[], timeout).await?;
        self.prompt = learn_prompt(&reply);
        if self.prompt.is_empty() {
            warn!("Could not detect the shell prompt; commands will end on timeout only");
        } else {
            debug!("Learned shell prompt: {:?}", self.prompt);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run a command, passing each stdout chunk to `listener` as it arrives.
    pub async fn run_with_listener(
        &mut self,
        command: &str,
        terminators: &[Terminator],
        timeout: Duration,
        listener: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<String, SessionError> {
        if !self.is_running() {
            return Err(SessionError::Closed);
        }
        self.drain();

        let stdin = self.stdin.as_mut().ok_or(SessionError::Closed)?;
        let line = format!("{command}\n");
        if let Err(e) = write_line(stdin, line.as_bytes()).await {
            self.running.store(false, Ordering::Release);
            return Err(SessionError::Io(e));
        }

        let default_terminator;
        let terminators = if terminators.is_empty() && !self.prompt.is_empty() {
            default_terminator = [Terminator::literal(self.prompt.clone())];
            &default_terminator[..]
        } else {
            terminators
        };

        let (stdout, stderr) = self.collect(terminators, timeout, listener).await;
        let output = strip_prompt(&stdout, &self.prompt);

        if !stderr.is_empty() {
            if let Some(replay) = &self.replay {
                replay.register_failure(command, &output, &stderr);
            }
            return Err(SessionError::Remote(stderr));
        }
        if let Some(replay) = &self.replay {
            replay.register(command, &output);
        }
        Ok(output)
    }

    /// Discard output left over from an earlier interaction.
    fn drain(&mut self) {
        let mut discarded = 0usize;
        while let Ok(chunk) = self.stdout_rx.try_recv() {
            discarded += chunk.len();
        }
        while let Ok(chunk) = self.stderr_rx.try_recv() {
            discarded += chunk.len();
        }
        if discarded > 0 {
            trace!("Drained {} bytes of stray output", discarded);
        }
    }

    /// Accumulate stdout and stderr until a terminator settles or the
    /// stream goes quiet for `timeout`.
    ///
    /// A match only counts once the matching queue is empty, so a terminator
    /// fragment inside a burst does not cut the burst short.
    async fn collect(
        &mut self,
        terminators: &[Terminator],
        timeout: Duration,
        mut listener: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> (String, String) {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let idle = tokio::time::sleep(timeout);
        tokio::pin!(idle);

        while stdout_open || stderr_open {
            tokio::select! {
                chunk = self.stdout_rx.recv(), if stdout_open => match chunk {
                    Some(chunk) => {
                        if let Some(listener) = listener.as_mut() {
                            listener(&chunk);
                        }
                        stdout.push_str(&chunk);
                        idle.as_mut().reset(Instant::now() + timeout);
                        if has_terminator(&stdout, terminators) && self.stdout_rx.is_empty() {
                            break;
                        }
                    }
                    None => stdout_open = false,
                },
                chunk = self.stderr_rx.recv(), if stderr_open => match chunk {
                    Some(chunk) => {
                        stderr.push_str(&chunk);
                        idle.as_mut().reset(Instant::now() + timeout);
                        if has_terminator(&stderr, terminators) && self.stderr_rx.is_empty() {
                            break;
                        }
                    }
                    None => stderr_open = false,
                },
                _ = &mut idle => {
                    trace!("No terminator matched within {:?}", timeout);
                    break;
                }
            }
        }
        (stdout, stderr)
    }

    /// Stop the draining tasks and release the channel. Safe to call twice.
    pub async fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                trace!("Failed to shut down shell input: {}", e);
            }
            debug!("Shell session closed");
        }
        for task in self.drain_tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

#[async_trait]
impl CommandSession for ShellSession {
    fn prompt(&self) -> &str {
        &self.prompt
    }

    async fn run(
        &mut self,
        command: &str,
        terminators: &[Terminator],
        timeout: Duration,
    ) -> Result<String, SessionError> {
        self.run_with_listener(command, terminators, timeout, None)
            .await
    }

    async fn system(&mut self) -> Result<String, SessionError> {
        if let Some(system) = &self.system {
            return Ok(system.clone());
        }
        let timeout = self.config.command_timeout;
        let output = self.run("uname -s", &[], timeout).await?;
        let system = output.trim().to_lowercase();
        self.system = Some(system.clone());
        Ok(system)
    }

    async fn close(&mut self) {
        ShellSession::close(self).await
    }
}

impl Replayable for ShellSession {
    fn set_replay(&mut self, replay: Option<Arc<ReplayCommands>>) {
        self.replay = replay;
    }
}

async fn write_line(stdin: &mut BoxedWriter, line: &[u8]) -> std::io::Result<()> {
    stdin.write_all(line).await?;
    stdin.flush().await
}

fn spawn_drain(
    name: &'static str,
    mut reader: BoxedReader,
    tx: mpsc::UnboundedSender<String>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        let mut decoder = Utf8Decoder::default();

        while running.load(Ordering::Acquire) {
            tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        trace!("{} reached end of stream", name);
                        running.store(false, Ordering::Release);
                        break;
                    }
                    Ok(n) => {
                        let text = decoder.decode(&buffer[..n]);
                        if !text.is_empty() && tx.send(text).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("{} read failed, closing session: {}", name, e);
                        running.store(false, Ordering::Release);
                        break;
                    }
                },
            }
        }
    })
}

/// Decodes a byte stream into text without splitting multi-byte characters
/// across chunk boundaries.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An incomplete sequence at the very end waits for the next chunk.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return text;
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }
}

/// The prompt is the last non-blank line the shell printed for an empty command.
fn learn_prompt(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Cut the answer at the first `"\n" + prompt`, dropping the line ending.
/// A reply made of nothing but the prompt carried no output.
fn strip_prompt(output: &str, prompt: &str) -> String {
    if prompt.is_empty() {
        return output.to_string();
    }
    if output.trim() == prompt {
        return String::new();
    }
    match output.find(&format!("\n{prompt}")) {
        Some(index) => output[..index].trim_end_matches('\r').to_string(),
        None => output.to_string(),
    }
}
