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
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::transfer::StorageService;

/// Download the file at `url` to `destination`.
///
/// Without a destination the remote file name is used in the current
/// directory; an existing local directory receives the remote file name.
/// Returns the written path and its size.
pub async fn download_file(
    storage: &dyn StorageService,
    url: &str,
    destination: Option<&Path>,
) -> Result<(PathBuf, u64)> {
    let object = storage
        .object(url)
        .await
        .with_context(|| format!("Failed to look up {url}"))?
        .with_context(|| format!("{url}: no such file"))?;
    anyhow::ensure!(!object.is_folder(), "{url} is a directory");

    let data = storage
        .download(&object)
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    let path = match destination {
        Some(path) if path.is_dir() => path.join(object.name()),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(object.name()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(&path, &data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Saved {} to {}", url, path.display());
    Ok((path, data.len() as u64))
}
