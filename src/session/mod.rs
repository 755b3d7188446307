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

//! Request/response command sessions over an interactive shell.
//!
//! A shell channel has no framing: output is a free-form byte stream. The
//! session learns the shell prompt once at open time and afterwards treats
//! "prompt seen and nothing more buffered" as the end of a response.
//! Completion detection is heuristic by nature. A command whose own output
//! contains the prompt text ends early, and a command that never returns
//! yields whatever it printed before the timeout, without an error.

mod shell;
mod terminator;

pub use shell::ShellSession;
pub use terminator::{has_terminator, Terminator};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Idle time allowed for the startup output and the prompt-revealing empty command.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default idle timeout for commands issued by the engine itself.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open shell channel: {0}")]
    Channel(#[from] crate::ssh::tokio_client::Error),

    #[error("session is closed")]
    Closed,

    #[error("failed to write to remote shell: {0}")]
    Io(#[from] std::io::Error),

    /// The command wrote to stderr; carries everything it wrote.
    #[error("{0}")]
    Remote(String),
}

/// Timeouts used by a [`ShellSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub handshake_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// A synchronous command/response interface over a shell.
///
/// Implemented by the live [`ShellSession`] and by
/// [`ReplaySession`](crate::replay::ReplaySession), so callers never need to
/// know whether a connection exists.
#[async_trait]
pub trait CommandSession: Send {
    /// The prompt learned when the session was opened.
    fn prompt(&self) -> &str;

    /// Run `command` and wait until a terminator matches or `timeout` of
    /// silence elapses. With no terminators the learned prompt is used.
    async fn run(
        &mut self,
        command: &str,
        terminators: &[Terminator],
        timeout: Duration,
    ) -> Result<String, SessionError>;

    /// Lowercased kernel name of the remote host (`uname -s`).
    async fn system(&mut self) -> Result<String, SessionError>;

    async fn close(&mut self);
}
