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

use std::io;
use thiserror::Error;

/// Errors raised while establishing the SSH transport or opening channels on it.
///
/// Every variant is a transport failure: callers treat them as fatal for the
/// session or tunnel that hit them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Address could not be resolved: {0}")]
    AddressInvalid(#[source] io::Error),

    #[error("Server host key check failed")]
    ServerCheckFailed,

    #[error("Wrong password")]
    PasswordWrong,

    #[error("Key authentication failed")]
    KeyAuthFailed,

    #[error("Unable to load key: {0}")]
    KeyInvalid(#[source] russh::keys::Error),

    #[error("Failed to connect to SSH agent")]
    AgentConnectionFailed,

    #[error("SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,

    #[error("Channel request '{0}' was rejected by the server")]
    ChannelRequestRejected(&'static str),

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
