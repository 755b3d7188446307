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

//! Source side of the scp sink protocol (`scp -t`), single regular file.
//!
//! The source sends `C<mode> <length> <name>\n`, the payload and a single
//! NUL byte. The sink answers each step with a status byte: `0` for ok,
//! `1` (warning) or `2` (fatal) followed by a message line.

use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::TransferError;

/// Remote command receiving a file into `directory`.
pub fn sink_command(directory: &str) -> String {
    format!("scp -qt {}", super::location::shell_quote(directory))
}

/// File creation header for a `length` byte file called `name`.
///
/// The name ends the header line and is taken relative to the sink
/// directory, so it may not contain a newline or a `/`.
pub fn header(name: &str, length: usize) -> Result<String, TransferError> {
    if name.is_empty() || name.contains(['\n', '/']) {
        return Err(TransferError::Scp(format!(
            "invalid file name {name:?} for scp"
        )));
    }
    Ok(format!("C0644 {length} {name}\n"))
}

/// Write one file to the sink, `chunk_size` bytes at a time with `pause`
/// between chunks.
pub async fn send_file<W>(
    writer: &mut W,
    name: &str,
    payload: &[u8],
    chunk_size: usize,
    pause: Duration,
) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = header(name, payload.len())?;
    writer.write_all(header.as_bytes()).await?;

    for (index, chunk) in payload.chunks(chunk_size.max(1)).enumerate() {
        if index > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        trace!("scp chunk {} ({} bytes)", index, chunk.len());
        writer.write_all(chunk).await?;
    }

    writer.write_all(&[0]).await?;
    writer.flush().await?;
    Ok(())
}

/// Interpret what the sink printed once the transfer finished.
pub fn check_status(stdout: &[u8], stderr: &[u8]) -> Result<(), TransferError> {
    match stdout.iter().position(|&byte| byte != 0) {
        Some(index) if matches!(stdout[index], 1 | 2) => Err(TransferError::Scp(
            String::from_utf8_lossy(&stdout[index + 1..]).trim().to_string(),
        )),
        Some(index) => Err(TransferError::Scp(format!(
            "unexpected sink response {:?}",
            String::from_utf8_lossy(&stdout[index..]).trim()
        ))),
        None if stdout.is_empty() && !stderr.is_empty() => Err(TransferError::Scp(
            String::from_utf8_lossy(stderr).trim().to_string(),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_file_wire_format() {
        let mut wire = Vec::new();
        send_file(&mut wire, "notes.txt", b"hello world", 4, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(wire, b"C0644 11 notes.txt\nhello world\0".to_vec());
    }

    #[tokio::test]
    async fn test_send_empty_file() {
        let mut wire = Vec::new();
        send_file(&mut wire, "empty", b"", 16, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(wire, b"C0644 0 empty\n\0".to_vec());
    }

    #[tokio::test]
    async fn test_names_that_break_the_header_are_refused() {
        for name in ["two\nlines", "dir/file", ""] {
            let mut wire = Vec::new();
            let err = send_file(&mut wire, name, b"data", 16, Duration::ZERO)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Scp(_)), "{name:?}");
            assert!(wire.is_empty());
        }
        assert_eq!(header("ok.txt", 3).unwrap(), "C0644 3 ok.txt\n");
    }

    #[test]
    fn test_status_ok() {
        assert!(check_status(&[0, 0, 0], b"").is_ok());
        assert!(check_status(b"", b"").is_ok());
    }

    #[test]
    fn test_status_errors() {
        match check_status(b"\0\x01scp: /ro/file: Permission denied\n", b"") {
            Err(TransferError::Scp(message)) => {
                assert_eq!(message, "scp: /ro/file: Permission denied")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(check_status(b"\x02fatal", b"").is_err());
        assert!(check_status(b"", b"scp: command not found").is_err());
        assert!(check_status(b"garbage", b"").is_err());
    }

    #[test]
    fn test_sink_command() {
        assert_eq!(sink_command("/tmp/dir"), "scp -qt /tmp/dir");
        assert_eq!(sink_command("/tmp/my dir"), "scp -qt '/tmp/my dir'");
    }
}
