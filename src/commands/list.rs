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
use std::fmt::Write;

use crate::transfer::{StorageObject, StorageService};
use crate::utils::format_bytes;

pub async fn list_objects(storage: &dyn StorageService, url: &str) -> Result<Vec<StorageObject>> {
    storage
        .list(url)
        .await
        .with_context(|| format!("Failed to list {url}"))
}

/// One line per object: kind, size, modification time (UTC) and name.
pub fn format_listing(objects: &[StorageObject], color: bool) -> String {
    let mut out = String::new();
    for object in objects {
        let kind = if object.is_folder() { 'd' } else { '-' };
        let modified = object.modified.format("%Y-%m-%d %H:%M:%S");
        let name = if object.is_folder() {
            format!("{}/", object.name())
        } else {
            object.name().to_string()
        };
        let name = if color && object.is_folder() {
            name.blue().bold().to_string()
        } else {
            name
        };
        let _ = writeln!(
            out,
            "{} {:>10} {} {}",
            kind,
            format_bytes(object.size),
            modified,
            name
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::ObjectKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_listing() {
        let modified = Utc.with_ymd_and_hms(2017, 11, 4, 22, 29, 33).unwrap();
        let objects = vec![
            StorageObject {
                url: "scp://h:22/srv/logs".into(),
                kind: ObjectKind::Folder,
                size: 4096,
                modified,
            },
            StorageObject {
                url: "scp://h:22/srv/a.txt".into(),
                kind: ObjectKind::Content,
                size: 12,
                modified,
            },
        ];
        let text = format_listing(&objects, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "d    4.00 KB 2017-11-04 22:29:33 logs/");
        assert_eq!(lines[1], "-       12 B 2017-11-04 22:29:33 a.txt");
    }
}
