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

use crate::transfer::StorageService;

/// Delete the file or directory at `url`.
pub async fn remove(storage: &dyn StorageService, url: &str) -> Result<()> {
    let object = storage
        .object(url)
        .await
        .with_context(|| format!("Failed to look up {url}"))?
        .with_context(|| format!("{url}: no such file or directory"))?;
    storage
        .delete(&object)
        .await
        .with_context(|| format!("Failed to delete {url}"))
}
