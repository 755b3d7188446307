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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Named hosts, usable wherever a `[user@]host[:port]` target is expected.
    #[serde(default)]
    pub hosts: HashMap<String, HostEntry>,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub transfer: TransferSettings,
}

/// Connection defaults applied to every target.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    /// Name of the environment variable holding the login password.
    pub password_env: Option<String>,
    pub use_agent: Option<bool>,
    pub known_hosts: Option<String>,
    /// `false` accepts any host key.
    pub strict_host_key_checking: Option<bool>,
    /// SSH keepalive interval in seconds. 0 disables keepalives.
    pub keepalive_interval: Option<u64>,
    pub keepalive_max: Option<usize>,
}

/// A named host.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HostEntry {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

/// Shell session settings.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct SessionSettings {
    /// Program started on the shell channel; empty requests the login shell.
    pub shell: Option<String>,
    pub term: Option<String>,
    pub cols: Option<u32>,
    pub rows: Option<u32>,
    pub handshake_timeout_ms: Option<u64>,
    /// Idle timeout of a command, in seconds.
    pub command_timeout: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Upload and download tuning.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct TransferSettings {
    pub chunk_size: Option<usize>,
    pub chunk_pause_ms: Option<u64>,
    pub verify_threshold: Option<usize>,
}
