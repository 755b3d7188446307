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

//! Drive a remote shell over SSH as a request/response protocol.
//!
//! A [`ShellSession`](session::ShellSession) opens an interactive shell,
//! learns its prompt and runs one command at a time. File operations on top
//! of it use only `ls`, `cat` and `scp` on the remote side
//! ([`transfer`]), local ports can be forwarded through the connection
//! ([`forwarding`]), and all traffic can be recorded and replayed offline
//! ([`replay`]).

pub mod cli;
pub mod commands;
pub mod config;
pub mod forwarding;
pub mod listing;
pub mod replay;
pub mod session;
pub mod ssh;
pub mod target;
pub mod transfer;
pub mod utils;

pub use session::{CommandSession, SessionConfig, SessionError, ShellSession, Terminator};
pub use ssh::{ChannelOpener, Client};
pub use transfer::{CopyService, StorageObject, StorageService, TransferError};
