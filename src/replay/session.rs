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
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::ReplayCommands;
use crate::session::{CommandSession, SessionError, Terminator};

/// A [`CommandSession`] answering from recorded outputs.
///
/// Terminators and timeouts are ignored: each `run` returns the next
/// recorded output for the command, or an empty string when none is left.
#[derive(Debug)]
pub struct ReplaySession {
    replay: Arc<ReplayCommands>,
    prompt: String,
    system: Option<String>,
    closed: bool,
}

impl ReplaySession {
    pub fn new(replay: Arc<ReplayCommands>) -> Self {
        Self {
            replay,
            prompt: String::new(),
            system: None,
            closed: false,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

#[async_trait]
impl CommandSession for ReplaySession {
    fn prompt(&self) -> &str {
        &self.prompt
    }

    async fn run(
        &mut self,
        command: &str,
        _terminators: &[Terminator],
        _timeout: Duration,
    ) -> Result<String, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        match self.replay.next_outcome(command) {
            Ok(output) => {
                trace!("Replayed {:?} -> {} bytes", command, output.len());
                Ok(output)
            }
            Err(stderr) => {
                trace!("Replayed {:?} -> failure", command);
                Err(SessionError::Remote(stderr))
            }
        }
    }

    async fn system(&mut self) -> Result<String, SessionError> {
        if let Some(system) = &self.system {
            return Ok(system.clone());
        }
        let system = self
            .run("uname -s", &[], Duration::ZERO)
            .await?
            .trim()
            .to_lowercase();
        self.system = Some(system.clone());
        Ok(system)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
