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
use owo_colors::OwoColorize;
use std::sync::Arc;

use crate::forwarding::Tunnel;
use crate::ssh::Client;

/// Forward `local` to `remote` through `client` until Ctrl-C.
pub async fn forward(client: Client, local: &str, remote: &str) -> Result<()> {
    let client = Arc::new(client);
    let tunnel = Tunnel::open(client.clone(), local, remote)
        .await
        .context("Failed to start port forwarding")?;

    println!(
        "{} Forwarding {} -> {} (Ctrl-C to stop)",
        "●".green(),
        tunnel.local_addr(),
        remote
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    tunnel.close().await;
    let stats = tunnel.stats();
    println!(
        "Forwarded {} connections, {} in total",
        stats.connections(),
        crate::utils::format_bytes(stats.total_bytes())
    );
    if let Err(e) = client.disconnect().await {
        tracing::debug!("Disconnect failed: {}", e);
    }
    Ok(())
}
