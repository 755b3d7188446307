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
use std::path::Path;
use tokio::fs;

use crate::transfer::StorageService;

/// Upload `source` to `url`; a URL ending in `/` receives the local file name.
///
/// Returns the final URL and the number of bytes sent.
pub async fn upload_file(
    storage: &dyn StorageService,
    source: &Path,
    url: &str,
) -> Result<(String, u64)> {
    let data = fs::read(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let url = if url.ends_with('/') {
        let name = source
            .file_name()
            .with_context(|| format!("{} has no file name", source.display()))?;
        format!("{}{}", url, name.to_string_lossy())
    } else {
        url.to_string()
    };

    storage
        .upload(&url, &data)
        .await
        .with_context(|| format!("Failed to upload {} to {}", source.display(), url))?;
    Ok((url, data.len() as u64))
}
