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

//! Subcommand implementations of the `sshrun` binary.

pub mod download;
pub mod exec;
pub mod forward;
pub mod list;
pub mod remove;
pub mod upload;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{Cli, Commands};
use crate::config::{AuthOptions, Config};
use crate::replay::{self, ReplayCommands, ReplayStorage};
use crate::ssh::Client;
use crate::target::Target;
use crate::transfer::{CopyService, StorageService};

/// Where command traffic comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Live,
    Record(PathBuf),
    Replay(PathBuf),
}

/// Everything a subcommand needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub host: String,
    pub user: Option<String>,
    pub auth: AuthOptions,
    pub mode: Mode,
}

impl CommandContext {
    pub fn from_cli(cli: &Cli, mut config: Config) -> Self {
        if let Some(timeout) = cli.timeout {
            config.session.command_timeout = Some(timeout);
        }
        let mode = match (&cli.record, &cli.replay) {
            (_, Some(dir)) => Mode::Replay(dir.clone()),
            (Some(dir), None) => Mode::Record(dir.clone()),
            (None, None) => Mode::Live,
        };
        Self {
            config,
            host: cli.command.host().to_string(),
            user: cli.user.clone(),
            auth: AuthOptions {
                identity: cli.identity.clone(),
                password: cli.password.clone(),
                passphrase: cli.passphrase.clone(),
                use_agent: cli.use_agent,
            },
            mode,
        }
    }

    pub fn target(&self) -> Result<Target> {
        self.config.resolve_target(&self.host, self.user.as_deref())
    }

    /// Address `path` on the target as an `scp://` URL; relative paths stay plain.
    pub fn url(&self, path: &str) -> Result<String> {
        if !path.starts_with('/') {
            return Ok(path.to_string());
        }
        let target = self.target()?;
        let host = if target.host.contains(':') {
            format!("[{}]", target.host)
        } else {
            target.host
        };
        Ok(format!("scp://{}:{}{}", host, target.port, path))
    }

    pub async fn connect(&self) -> Result<Client> {
        let target = self.target()?;
        let auth = self.config.auth_method(&self.host, &self.auth)?;
        let server_check = self.config.server_check();
        let ssh_config = match self.config.keepalive() {
            Some((interval, max)) => Client::keepalive_config(interval, max),
            None => Default::default(),
        };

        tracing::debug!("Connecting to {}", target);
        Client::connect_with_config(
            &target.host,
            target.port,
            &target.username,
            auth,
            server_check,
            ssh_config,
        )
        .await
        .with_context(|| format!("Failed to connect to {target}"))
    }

    /// A fresh recorder when `--record` was given.
    pub fn recorder(&self) -> Option<Arc<ReplayCommands>> {
        match &self.mode {
            Mode::Record(dir) => Some(Arc::new(ReplayCommands::new(dir.clone()))),
            _ => None,
        }
    }

    /// The recording to answer from when `--replay` was given.
    pub async fn replay_set(&self) -> Result<Option<Arc<ReplayCommands>>> {
        match &self.mode {
            Mode::Replay(dir) => {
                let commands = ReplayCommands::open(dir.clone())
                    .await
                    .with_context(|| format!("Failed to load recording from {}", dir.display()))?;
                Ok(Some(Arc::new(commands)))
            }
            _ => Ok(None),
        }
    }

    /// Storage backend for file commands: live (optionally recording) or replayed.
    pub async fn storage(&self) -> Result<(Box<dyn StorageService>, Option<Arc<ReplayCommands>>)> {
        if let Some(replay) = self.replay_set().await? {
            let storage = ReplayStorage::new(replay).with_config(self.config.transfer_config());
            return Ok((Box::new(storage), None));
        }

        let client = self.connect().await?;
        let mut service = CopyService::new(Arc::new(client))
            .with_config(self.config.transfer_config())
            .with_session_config(self.config.session_config())
            .with_shell(self.config.shell_request());
        let recorder = self.recorder();
        if let Some(recorder) = &recorder {
            replay::enable(&mut service, Arc::clone(recorder));
        }
        Ok((Box::new(service), recorder))
    }
}

/// Persist a recording, if one was made.
pub async fn save_recording(recorder: Option<Arc<ReplayCommands>>) -> Result<()> {
    if let Some(recorder) = recorder {
        recorder
            .store()
            .await
            .with_context(|| format!("Failed to store recording in {}", recorder.base_dir().display()))?;
        eprintln!(
            "{} {} commands recorded to {}",
            "●".green(),
            recorder.keys().len(),
            recorder.base_dir().display()
        );
    }
    Ok(())
}

/// Run the parsed command line.
pub async fn execute(cli: Cli, config: Config) -> Result<()> {
    let context = CommandContext::from_cli(&cli, config);

    match cli.command {
        Commands::Run {
            terminators,
            command,
            ..
        } => {
            let output = exec::execute_command(&context, &command.join(" "), &terminators).await?;
            println!("{output}");
        }
        Commands::Ls { path, .. } => {
            let url = context.url(&path)?;
            let (storage, recorder) = context.storage().await?;
            let objects = list::list_objects(storage.as_ref(), &url).await?;
            print!("{}", list::format_listing(&objects, true));
            save_recording(recorder).await?;
        }
        Commands::Get { remote, local, .. } => {
            let url = context.url(&remote)?;
            let (storage, recorder) = context.storage().await?;
            let (path, size) = download::download_file(storage.as_ref(), &url, local.as_deref()).await?;
            save_recording(recorder).await?;
            println!(
                "{} Downloaded {} to {} ({})",
                "✓".green(),
                remote,
                path.display(),
                crate::utils::format_bytes(size)
            );
        }
        Commands::Put { local, remote, .. } => {
            let url = context.url(&remote)?;
            let (storage, recorder) = context.storage().await?;
            let (url, size) = upload::upload_file(storage.as_ref(), &local, &url).await?;
            save_recording(recorder).await?;
            println!(
                "{} Uploaded {} to {} ({})",
                "✓".green(),
                local.display(),
                url,
                crate::utils::format_bytes(size)
            );
        }
        Commands::Rm { remote, .. } => {
            let url = context.url(&remote)?;
            let (storage, recorder) = context.storage().await?;
            remove::remove(storage.as_ref(), &url).await?;
            save_recording(recorder).await?;
            println!("{} Removed {}", "✓".green(), remote);
        }
        Commands::Forward { local, remote, .. } => {
            anyhow::ensure!(
                context.mode == Mode::Live,
                "Port forwarding cannot be recorded or replayed"
            );
            let client = context.connect().await?;
            forward::forward(client, &local, &remote).await?;
        }
    }
    Ok(())
}
