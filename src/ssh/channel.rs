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

//! Channel abstraction shared by sessions, transfers and tunnels.
//!
//! Everything above the bootstrap talks to the remote side through
//! [`ChannelOpener`]. A live [`Client`](super::tokio_client::Client) bridges
//! its russh channels into plain tokio streams; tests plug in an in-memory
//! implementation speaking the same interface.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::tokio_client::Error;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Full-duplex byte stream carried by a forwarding channel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelStream for T {}

pub type BoxedStream = Box<dyn TunnelStream>;

/// The three standard streams of a remote process.
///
/// Dropping `stdin` sends EOF to the remote process. `stdout` and `stderr`
/// report end-of-stream once the channel closes.
pub struct ChannelStreams {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
}

impl std::fmt::Debug for ChannelStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStreams").finish_non_exhaustive()
    }
}

/// Terminal geometry requested for an interactive shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cols: 100,
            rows: 100,
        }
    }
}

/// Parameters of an interactive shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// Program to start on the channel. Empty starts the login shell.
    pub shell: String,
    pub env: BTreeMap<String, String>,
    pub size: TerminalSize,
    pub term_type: String,
}

impl Default for ShellRequest {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            env: BTreeMap::new(),
            size: TerminalSize::default(),
            term_type: "xterm".to_string(),
        }
    }
}

impl ShellRequest {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }
}

/// Opens logical channels over an established secure connection.
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Start an interactive shell on a PTY with echo disabled.
    async fn open_shell(&self, request: &ShellRequest) -> Result<ChannelStreams, Error>;

    /// Start a single non-interactive command without a PTY.
    async fn open_exec(&self, command: &str) -> Result<ChannelStreams, Error>;

    /// Open a forwarding channel to `host:port` as seen from the remote side.
    async fn open_tunnel(&self, host: &str, port: u16) -> Result<BoxedStream, Error>;
}

/// Output of a command run to completion on an exec channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Drain both output streams of an exec channel until the remote side closes.
///
/// The streams are read concurrently so that a chatty stderr can never stall
/// stdout behind a full pipe.
pub async fn collect_output(
    stdout: &mut BoxedReader,
    stderr: &mut BoxedReader,
) -> Result<ExecOutput, Error> {
    let mut output = ExecOutput::default();
    let (out, err) = tokio::join!(
        stdout.read_to_end(&mut output.stdout),
        stderr.read_to_end(&mut output.stderr)
    );
    out?;
    err?;
    Ok(output)
}

/// Run `command` on a fresh exec channel and collect everything it prints.
pub async fn exec_command(
    opener: &dyn ChannelOpener,
    command: &str,
) -> Result<ExecOutput, Error> {
    let ChannelStreams {
        stdin,
        mut stdout,
        mut stderr,
    } = opener.open_exec(command).await?;
    drop(stdin);
    collect_output(&mut stdout, &mut stderr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_collect_output_reads_both_streams() {
        let (mut out_tx, out_rx) = tokio::io::duplex(8);
        let (mut err_tx, err_rx) = tokio::io::duplex(8);
        let mut stdout: BoxedReader = Box::new(out_rx);
        let mut stderr: BoxedReader = Box::new(err_rx);

        let writer = tokio::spawn(async move {
            // Larger than the pipe capacity on both streams.
            out_tx.write_all(b"stdout payload").await.unwrap();
            err_tx.write_all(b"stderr payload").await.unwrap();
        });

        let output = collect_output(&mut stdout, &mut stderr).await.unwrap();
        writer.await.unwrap();
        assert_eq!(output.stdout, b"stdout payload");
        assert_eq!(output.stderr_text(), "stderr payload");
    }

    #[test]
    fn test_shell_request_builder() {
        let request = ShellRequest::new("/bin/sh")
            .with_env("LANG", "C")
            .with_size(TerminalSize { cols: 80, rows: 24 });
        assert_eq!(request.shell, "/bin/sh");
        assert_eq!(request.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(request.size.cols, 80);
    }
}
