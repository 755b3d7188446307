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

//! Local port forwarding over an established connection.

mod tunnel;

pub use tunnel::{Tunnel, TunnelStats};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid remote address {0:?}, expected host:port")]
    InvalidAddress(String),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Split `host:port` (or `[v6]:port`) into its parts.
pub fn parse_remote_address(addr: &str) -> Result<(String, u16), ForwardError> {
    let invalid = || ForwardError::InvalidAddress(addr.to_string());
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_address() {
        assert_eq!(
            parse_remote_address("db.internal:5432").unwrap(),
            ("db.internal".to_string(), 5432)
        );
        assert_eq!(
            parse_remote_address("[::1]:8080").unwrap(),
            ("::1".to_string(), 8080)
        );
        assert!(parse_remote_address("nohost").is_err());
        assert!(parse_remote_address(":80").is_err());
        assert!(parse_remote_address("host:0").is_err());
        assert!(parse_remote_address("host:http").is_err());
    }
}
