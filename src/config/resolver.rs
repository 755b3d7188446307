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

//! Turning configuration into connection, session and transfer settings.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::Config;
use super::utils::{default_key_file, expand_tilde, get_current_username};
use crate::session::SessionConfig;
use crate::ssh::tokio_client::{AuthMethod, ServerCheckMethod};
use crate::ssh::{ShellRequest, TerminalSize};
use crate::target::{Target, DEFAULT_SSH_PORT};
use crate::transfer::TransferConfig;

/// Credentials given on the command line or through the environment.
#[derive(Default, Clone)]
pub struct AuthOptions {
    pub identity: Option<PathBuf>,
    pub password: Option<String>,
    pub passphrase: Option<String>,
    pub use_agent: bool,
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("identity", &self.identity)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("use_agent", &self.use_agent)
            .finish()
    }
}

impl Config {
    /// Resolve a named host or a `[user@]host[:port]` string.
    ///
    /// `user` overrides everything else; then the target's own user, the
    /// configured default, and finally `$USER`.
    pub fn resolve_target(&self, spec: &str, user: Option<&str>) -> Result<Target> {
        let default_user = self
            .defaults
            .user
            .clone()
            .unwrap_or_else(get_current_username);
        let default_port = self.defaults.port.unwrap_or(DEFAULT_SSH_PORT);

        let mut target = match self.hosts.get(spec) {
            Some(entry) => Target::new(
                entry.host.clone(),
                entry.port.unwrap_or(default_port),
                entry.user.clone().unwrap_or(default_user),
            ),
            None => Target::parse(spec, &default_user, default_port)?,
        };
        if let Some(user) = user {
            target.username = user.to_string();
        }
        Ok(target)
    }

    /// Pick the authentication method for `spec`.
    ///
    /// Order: password, explicit identity, the host's key, the default key,
    /// the SSH agent, then the first of `~/.ssh/id_ed25519`, `id_ecdsa`,
    /// `id_rsa` that exists.
    pub fn auth_method(&self, spec: &str, options: &AuthOptions) -> Result<AuthMethod> {
        let password = options.password.clone().or_else(|| {
            self.defaults
                .password_env
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
        });
        if let Some(password) = password {
            return Ok(AuthMethod::with_password(&password));
        }

        let passphrase = options.passphrase.as_deref();
        let configured_key = options
            .identity
            .clone()
            .or_else(|| {
                self.hosts
                    .get(spec)
                    .and_then(|entry| entry.ssh_key.as_ref())
                    .map(PathBuf::from)
            })
            .or_else(|| self.defaults.ssh_key.as_ref().map(PathBuf::from));
        if let Some(key) = configured_key {
            return Ok(AuthMethod::with_key_file(expand_tilde(&key), passphrase));
        }

        #[cfg(not(target_os = "windows"))]
        {
            let use_agent = options.use_agent || self.defaults.use_agent.unwrap_or(false);
            if use_agent && std::env::var_os("SSH_AUTH_SOCK").is_some() {
                return Ok(AuthMethod::with_agent());
            }
        }

        match default_key_file() {
            Some(key) => Ok(AuthMethod::with_key_file(key, passphrase)),
            None => anyhow::bail!(
                "No authentication method available: set a password, pass --identity or configure defaults.ssh_key"
            ),
        }
    }

    pub fn server_check(&self) -> ServerCheckMethod {
        if self.defaults.strict_host_key_checking == Some(false) {
            return ServerCheckMethod::NoCheck;
        }
        match &self.defaults.known_hosts {
            Some(path) => {
                let path = expand_tilde(Path::new(path));
                ServerCheckMethod::with_known_hosts_file(&path.to_string_lossy())
            }
            None => ServerCheckMethod::DefaultKnownHostsFile,
        }
    }

    /// Keepalive interval and missed-reply limit, if enabled.
    pub fn keepalive(&self) -> Option<(Duration, usize)> {
        match self.defaults.keepalive_interval {
            Some(0) => None,
            Some(secs) => Some((
                Duration::from_secs(secs),
                self.defaults.keepalive_max.unwrap_or(3),
            )),
            None => None,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            handshake_timeout: self
                .session
                .handshake_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.handshake_timeout),
            command_timeout: self
                .session
                .command_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
        }
    }

    pub fn shell_request(&self) -> ShellRequest {
        let defaults = ShellRequest::default();
        let size = TerminalSize {
            cols: self.session.cols.unwrap_or(defaults.size.cols),
            rows: self.session.rows.unwrap_or(defaults.size.rows),
        };
        ShellRequest {
            shell: self.session.shell.clone().unwrap_or(defaults.shell),
            env: self.session.env.clone(),
            size,
            term_type: self.session.term.clone().unwrap_or(defaults.term_type),
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        let defaults = TransferConfig::default();
        TransferConfig {
            chunk_size: self.transfer.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_pause: self
                .transfer
                .chunk_pause_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.chunk_pause),
            verify_threshold: self
                .transfer
                .verify_threshold
                .unwrap_or(defaults.verify_threshold),
            command_timeout: self.session_config().command_timeout,
        }
    }
}
