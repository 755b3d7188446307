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

//! Channel operations: shell, exec and `direct-tcpip` channels.
//!
//! Session and exec channels are bridged into tokio duplex pipes by a pump
//! task that owns the russh [`Channel`]. The pump routes `Data` to stdout,
//! extended data type 1 to stderr, and forwards whatever is written to stdin
//! as channel data. When the caller drops stdin the pump sends EOF; when the
//! remote side closes, both output pipes reach end-of-stream.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, trace};

use super::connection::Client;
use crate::ssh::channel::{BoxedStream, ChannelOpener, ChannelStreams, ShellRequest};

/// Capacity of each bridged pipe, matching typical SSH packet sizes.
const PIPE_CAPACITY: usize = 32 * 1024;

/// Read buffer for stdin forwarding.
const SSH_IO_BUFFER_SIZE: usize = 4096;

/// Extended data type code for stderr (RFC 4254 section 5.2).
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Terminal modes for automation shells.
///
/// Echo is off so that typed commands never show up in the captured output.
fn automation_terminal_modes() -> Vec<(Pty, u32)> {
    vec![
        (Pty::VINTR, 0x03),
        (Pty::VEOF, 0x04),
        (Pty::ICRNL, 1),
        (Pty::ISIG, 1),
        (Pty::ICANON, 1),
        (Pty::ECHO, 0),
        (Pty::ECHOE, 0),
        (Pty::ECHOK, 0),
        (Pty::ECHONL, 0),
        (Pty::OPOST, 1),
        (Pty::ONLCR, 1),
        (Pty::CS8, 1),
        (Pty::TTY_OP_ISPEED, 14400),
        (Pty::TTY_OP_OSPEED, 14400),
    ]
}

impl Client {
    async fn open_session_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }
}

#[async_trait]
impl ChannelOpener for Client {
    async fn open_shell(&self, request: &ShellRequest) -> Result<ChannelStreams, super::Error> {
        let channel = self.open_session_channel().await?;

        for (key, value) in &request.env {
            // Servers commonly refuse env requests unless AcceptEnv allows them.
            if let Err(e) = channel.set_env(false, key.as_str(), value.as_str()).await {
                debug!("Server did not accept environment variable {}: {}", key, e);
            }
        }

        channel
            .request_pty(
                false,
                &request.term_type,
                request.size.cols,
                request.size.rows,
                0,
                0,
                &automation_terminal_modes(),
            )
            .await?;

        if request.shell.is_empty() {
            channel.request_shell(false).await?;
        } else {
            channel.exec(false, request.shell.as_str()).await?;
        }
        debug!("Shell channel started: {:?}", request.shell);

        Ok(bridge(channel))
    }

    async fn open_exec(&self, command: &str) -> Result<ChannelStreams, super::Error> {
        let channel = self.open_session_channel().await?;
        channel.exec(false, command).await?;
        trace!("Exec channel started: {}", command);
        Ok(bridge(channel))
    }

    async fn open_tunnel(&self, host: &str, port: u16) -> Result<BoxedStream, super::Error> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, port.into(), "127.0.0.1", 0)
            .await?;
        Ok(Box::new(channel.into_stream()))
    }
}

/// Attach a pump task to `channel` and hand back plain tokio streams.
fn bridge(channel: Channel<Msg>) -> ChannelStreams {
    let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);

    tokio::spawn(pump(channel, stdin_remote, stdout_remote, stderr_remote));

    ChannelStreams {
        stdin: Box::new(stdin_local),
        stdout: Box::new(stdout_local),
        stderr: Box::new(stderr_local),
    }
}

async fn pump(
    mut channel: Channel<Msg>,
    mut stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
) {
    let mut buffer = vec![0u8; SSH_IO_BUFFER_SIZE];
    let mut input_open = true;

    loop {
        tokio::select! {
            read = stdin.read(&mut buffer), if input_open => {
                match read {
                    Ok(0) | Err(_) => {
                        input_open = false;
                        if let Err(e) = channel.eof().await {
                            trace!("Failed to send EOF: {}", e);
                            break;
                        }
                    }
                    Ok(n) => {
                        if let Err(e) = channel.data(&buffer[..n]).await {
                            debug!("Channel write failed: {}", e);
                            break;
                        }
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { data }) => {
                        if stdout.write_all(&data).await.is_err() {
                            trace!("stdout reader gone, closing channel");
                            break;
                        }
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                        if stderr.write_all(&data).await.is_err() {
                            trace!("stderr reader gone, closing channel");
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        trace!("Remote process exited with status {}", exit_status);
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(other) => trace!("Ignoring channel message: {:?}", other),
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        trace!("Failed to close channel: {}", e);
    }
}
