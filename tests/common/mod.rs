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

//! An in-memory host answering shell, `cat` and `scp -t` channels.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use sshrun::session::SessionConfig;
use sshrun::ssh::tokio_client::Error;
use sshrun::ssh::{BoxedStream, ChannelOpener, ChannelStreams, ShellRequest};
use sshrun::transfer::TransferConfig;

const PIPE_CAPACITY: usize = 256 * 1024;
const TIMESTAMP: &str = "2017-11-04 22:29:33.000000000 +0000";

/// Modification time every fake entry reports.
pub const MODIFIED_EPOCH: i64 = 1509834573;

#[derive(Debug, Default)]
struct HostState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    log: Vec<String>,
    short_reads: usize,
    short_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.add_dir("/");
        host
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.lock();
        make_dirs(&mut state, path);
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        let mut state = self.lock();
        make_dirs(&mut state, &parent(path));
        state.files.insert(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    /// Shell lines and exec commands received so far.
    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Truncate the next `count` `cat` outputs to half their size.
    pub fn short_reads(&self, count: usize) {
        self.lock().short_reads = count;
    }

    /// Store only half of the next `count` scp payloads.
    pub fn short_writes(&self, count: usize) {
        self.lock().short_writes = count;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    /// Answer one shell line: `Ok` goes to stdout, `Err` to stderr.
    fn shell_reply(&self, line: &str) -> Result<String, String> {
        let mut state = self.lock();
        state.log.push(line.to_string());

        if line.is_empty() {
            return Ok(String::new());
        }
        if line == "uname -s" {
            return Ok("Linux".to_string());
        }
        if let Some(text) = line.strip_prefix("echo ") {
            return Ok(text.to_string());
        }
        if let Some(path) = line.strip_prefix("ls -ltr --time-style=full-iso ") {
            return list(&state, &unquote(path));
        }
        if let Some(path) = line.strip_prefix("mkdir -p ") {
            make_dirs(&mut state, &unquote(path));
            return Ok(String::new());
        }
        if let Some(path) = line.strip_prefix("rm -rf ") {
            let path = unquote(path);
            let nested = format!("{path}/");
            state
                .files
                .retain(|file, _| file != &path && !file.starts_with(&nested));
            state
                .dirs
                .retain(|dir| dir != &path && !dir.starts_with(&nested));
            return Ok(String::new());
        }
        Err(format!("sh: {line}: command not found"))
    }

    fn cat(&self, path: &str) -> Result<Vec<u8>, String> {
        let mut state = self.lock();
        let mut data = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("cat: {path}: No such file or directory"))?;
        if state.short_reads > 0 {
            state.short_reads -= 1;
            data.truncate(data.len() / 2);
        }
        Ok(data)
    }

    /// Store an scp payload: `C<mode> <len> <name>\n<data>\0`.
    fn receive(&self, directory: &str, wire: &[u8]) -> Result<(), String> {
        let newline = wire
            .iter()
            .position(|&b| b == b'\n')
            .ok_or("scp: missing header")?;
        let header = String::from_utf8_lossy(&wire[..newline]).to_string();
        let mut fields = header.splitn(3, ' ');
        let (_mode, length, name) = match (fields.next(), fields.next(), fields.next()) {
            (Some(mode), Some(length), Some(name)) if mode.starts_with('C') => (mode, length, name),
            _ => return Err(format!("scp: bad header {header:?}")),
        };
        let length: usize = length.parse().map_err(|_| "scp: bad length")?;
        let start = newline + 1;
        let mut data = wire
            .get(start..start + length)
            .ok_or("scp: short payload")?
            .to_vec();
        if wire.get(start + length) != Some(&0) {
            return Err("scp: missing terminator".to_string());
        }

        let mut state = self.lock();
        if !state.dirs.contains(directory) {
            return Err(format!("scp: {directory}: No such file or directory"));
        }
        if state.short_writes > 0 {
            state.short_writes -= 1;
            data.truncate(data.len() / 2);
        }
        let path = if directory == "/" {
            format!("/{name}")
        } else {
            format!("{directory}/{name}")
        };
        state.files.insert(path, data);
        Ok(())
    }
}

fn unquote(path: &str) -> String {
    path.trim()
        .strip_prefix('\'')
        .and_then(|p| p.strip_suffix('\''))
        .map(|p| p.replace("'\\''", "'"))
        .unwrap_or_else(|| path.trim().to_string())
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

fn make_dirs(state: &mut HostState, path: &str) {
    let mut current = path.trim_end_matches('/').to_string();
    while !current.is_empty() {
        state.dirs.insert(current.clone());
        current = match current.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
    }
    state.dirs.insert("/".to_string());
}

fn entry(kind: char, size: usize, name: &str) -> String {
    let permission = if kind == 'd' { "drwxr-xr-x" } else { "-rw-r--r--" };
    format!("{permission} 1 ops staff {size} {TIMESTAMP} {name}")
}

fn list(state: &HostState, path: &str) -> Result<String, String> {
    if let Some(data) = state.files.get(path) {
        return Ok(entry('-', data.len(), path));
    }
    if !state.dirs.contains(path) {
        return Err(format!(
            "ls: cannot access '{path}': No such file or directory"
        ));
    }
    let mut lines = vec!["total 8".to_string()];
    for dir in state.dirs.iter().filter(|d| *d != path && parent(d) == path) {
        lines.push(entry('d', 4096, dir.rsplit('/').next().unwrap_or(dir)));
    }
    for (file, data) in state.files.iter().filter(|(f, _)| parent(f) == path) {
        lines.push(entry('-', data.len(), file.rsplit('/').next().unwrap_or(file)));
    }
    Ok(lines.join("\r\n"))
}

#[async_trait]
impl ChannelOpener for FakeHost {
    async fn open_shell(&self, _request: &ShellRequest) -> Result<ChannelStreams, Error> {
        let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);
        let host = self.clone();

        tokio::spawn(async move {
            let _ = stdout_remote.write_all(b"Last login: never\r\n$ ").await;
            let mut lines = BufReader::new(stdin_remote).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match host.shell_reply(&line) {
                    Ok(text) if text.is_empty() => "$ ".to_string(),
                    Ok(text) => format!("{text}\r\n$ "),
                    Err(message) => {
                        let _ = stderr_remote.write_all(message.as_bytes()).await;
                        // Let stderr land before the prompt returns.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "$ ".to_string()
                    }
                };
                if stdout_remote.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        Ok(ChannelStreams {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
        })
    }

    async fn open_exec(&self, command: &str) -> Result<ChannelStreams, Error> {
        let (stdin_local, mut stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);
        let host = self.clone();
        let command = command.to_string();
        host.lock().log.push(command.clone());

        tokio::spawn(async move {
            if let Some(path) = command.strip_prefix("cat ") {
                match host.cat(&unquote(path)) {
                    Ok(data) => {
                        let _ = stdout_remote.write_all(&data).await;
                    }
                    Err(message) => {
                        let _ = stderr_remote.write_all(message.as_bytes()).await;
                    }
                }
            } else if let Some(directory) = command.strip_prefix("scp -qt ") {
                let mut wire = Vec::new();
                let _ = stdin_remote.read_to_end(&mut wire).await;
                match host.receive(&unquote(directory), &wire) {
                    Ok(()) => {
                        let _ = stdout_remote.write_all(&[0, 0, 0]).await;
                    }
                    Err(message) => {
                        let _ = stdout_remote
                            .write_all(format!("\x01{message}\n").as_bytes())
                            .await;
                    }
                }
            } else {
                let _ = stderr_remote
                    .write_all(format!("{command}: not supported").as_bytes())
                    .await;
            }
        });

        Ok(ChannelStreams {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
        })
    }

    async fn open_tunnel(&self, _host: &str, _port: u16) -> Result<BoxedStream, Error> {
        Err(Error::ChannelRequestRejected("direct-tcpip"))
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        handshake_timeout: Duration::from_millis(50),
        command_timeout: Duration::from_secs(2),
    }
}

pub fn transfer_config() -> TransferConfig {
    TransferConfig {
        chunk_size: 16,
        chunk_pause: Duration::ZERO,
        verify_threshold: 1024 * 1024,
        command_timeout: Duration::from_secs(2),
    }
}
