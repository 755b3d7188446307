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

use anyhow::{Context, Result};
use std::sync::Arc;

use super::CommandContext;
use crate::replay::{self, ReplaySession};
use crate::session::{CommandSession, ShellSession, Terminator};

/// Run `command` in a shell on the context's host and return its output.
///
/// Live sessions record into the `--record` directory when one is set;
/// with `--replay` the output comes from the recording.
pub async fn execute_command(
    context: &CommandContext,
    command: &str,
    terminators: &[String],
) -> Result<String> {
    let terminators: Vec<Terminator> = terminators.iter().map(|t| Terminator::parse(t)).collect();
    let timeout = context.config.session_config().command_timeout;

    if let Some(replay) = context.replay_set().await? {
        let mut session = ReplaySession::new(replay);
        return run_in(&mut session, command, &terminators, timeout).await;
    }

    let client = Arc::new(context.connect().await?);
    let mut session = ShellSession::open(
        client.as_ref(),
        &context.config.shell_request(),
        context.config.session_config(),
    )
    .await
    .context("Failed to open a shell session")?;

    let recorder = context.recorder();
    if let Some(recorder) = &recorder {
        replay::enable(&mut session, Arc::clone(recorder));
    }

    let output = run_in(&mut session, command, &terminators, timeout).await;
    session.close().await;
    if let Err(e) = client.disconnect().await {
        tracing::debug!("Disconnect failed: {}", e);
    }

    let output = output?;
    super::save_recording(recorder).await?;
    Ok(output)
}

/// Run one command on any session, live or replayed.
pub async fn run_in(
    session: &mut dyn CommandSession,
    command: &str,
    terminators: &[Terminator],
    timeout: std::time::Duration,
) -> Result<String> {
    tracing::info!("Running {:?}", command);
    session
        .run(command, terminators, timeout)
        .await
        .with_context(|| format!("Command {command:?} failed"))
}
