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
use std::fmt;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// A host to connect to, as `user@host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }

    /// Parse `host`, `host:port`, `user@host` or `user@host:port`.
    ///
    /// IPv6 literals need brackets when a port is given (`[::1]:2222`).
    pub fn parse(spec: &str, default_user: &str, default_port: u16) -> Result<Self> {
        let (user_part, host_part) = match spec.rsplit_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, spec),
        };

        let (host, port) = if let Some(rest) = host_part.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .with_context(|| format!("Unterminated IPv6 address in {spec:?}"))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None => (host, default_port),
            }
        } else if host_part.matches(':').count() == 1 {
            let (host, port) = host_part.split_once(':').unwrap_or((host_part, ""));
            (host, parse_port(port)?)
        } else {
            (host_part, default_port)
        };

        anyhow::ensure!(!host.is_empty(), "Missing host name in {spec:?}");
        let username = match user_part {
            Some(user) if !user.is_empty() => user,
            _ => default_user,
        };

        Ok(Self::new(host, port, username))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .with_context(|| format!("Invalid port number {port:?}"))
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}
