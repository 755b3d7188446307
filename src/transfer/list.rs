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

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::location::{self, shell_quote};
use super::{ObjectKind, StorageObject, TransferError};
use crate::listing::parse_listing;
use crate::session::{CommandSession, SessionError};

/// The `ls` invocation for a host whose `uname -s` is `system`.
///
/// GNU `ls` understands `--time-style=full-iso`; BSD and macOS `ls` need
/// `-T` to print seconds and the year.
pub fn list_command(system: &str, path: &str) -> String {
    let system = system.to_ascii_lowercase();
    if system.contains("darwin") || system.contains("bsd") {
        format!("ls -lTtr {}", shell_quote(path))
    } else {
        format!("ls -ltr --time-style=full-iso {}", shell_quote(path))
    }
}

async fn run_listing(
    session: &mut dyn CommandSession,
    system: &str,
    path: &str,
    timeout: Duration,
) -> Result<String, TransferError> {
    match session.run(&list_command(system, path), &[], timeout).await {
        Ok(stdout) => Ok(stdout),
        Err(SessionError::Remote(message))
            if message.to_lowercase().contains("no such file or directory") =>
        {
            Ok(String::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn listing_path(url: &str) -> &str {
    match location::remote_path(url) {
        "" => ".",
        path => path,
    }
}

/// List `url` through `session`.
///
/// A directory yields its children. A file yields itself, either because
/// `ls` printed the single entry under its full path or, when the direct
/// listing is empty, by listing the parent and keeping the exact name.
pub async fn list_objects(
    session: &mut dyn CommandSession,
    url: &str,
    system: &str,
    timeout: Duration,
) -> Result<Vec<StorageObject>, TransferError> {
    let path = location::remote_path(url);
    let stdout = run_listing(session, system, path, timeout).await?;
    let mut entries = parse_listing(url, &stdout, true)?;

    if entries.len() == 1 && entries[0].name == path {
        entries[0].url = url.to_string();
    }

    if entries.is_empty() {
        let (parent_url, name) = location::split(url);
        if name.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Empty listing of {}, looking for {} in {}", url, name, parent_url);
        let stdout = run_listing(session, system, listing_path(&parent_url), timeout).await?;
        // An empty folder shows up in its parent but has no children.
        entries = parse_listing(&parent_url, &stdout, true)?
            .into_iter()
            .filter(|entry| entry.name == name && !entry.is_dir)
            .map(|mut entry| {
                entry.url = url.to_string();
                entry
            })
            .collect();
    }

    Ok(entries.into_iter().map(StorageObject::from).collect())
}

/// Describe the object at `url` itself by listing its parent.
pub async fn find_object(
    session: &mut dyn CommandSession,
    url: &str,
    system: &str,
    timeout: Duration,
) -> Result<Option<StorageObject>, TransferError> {
    let (parent_url, name) = location::split(url);
    if name.is_empty() {
        return Ok(Some(StorageObject {
            url: url.to_string(),
            kind: ObjectKind::Folder,
            size: 0,
            modified: DateTime::<Utc>::UNIX_EPOCH,
        }));
    }

    let stdout = run_listing(session, system, listing_path(&parent_url), timeout).await?;
    let object = parse_listing(&parent_url, &stdout, true)?
        .into_iter()
        .find(|entry| entry.name == name)
        .map(|mut entry| {
            entry.url = url.to_string();
            StorageObject::from(entry)
        });
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{ReplayCommands, ReplaySession};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn session(pairs: &[(&str, &str)]) -> ReplaySession {
        let replay = Arc::new(ReplayCommands::new("unused"));
        replay.register("uname -s", "Linux");
        for (input, output) in pairs {
            replay.register(input, output);
        }
        ReplaySession::new(replay)
    }

    #[test]
    fn test_list_command_per_system() {
        assert_eq!(list_command("linux", "/tmp"), "ls -ltr --time-style=full-iso /tmp");
        assert_eq!(list_command("Darwin", "/tmp"), "ls -lTtr /tmp");
        assert_eq!(list_command("freebsd", "/a b"), "ls -lTtr '/a b'");
    }

    #[tokio::test]
    async fn test_list_directory() {
        let mut session = session(&[(
            "ls -ltr --time-style=full-iso /data",
            "total 8\n\
             -rw-r--r-- 1 u g 12 2018-01-02 10:00:00.000000000 +0000 a.txt\n\
             drwxr-xr-x 2 u g 4096 2018-01-02 11:00:00.000000000 +0000 sub",
        )]);
        let objects = list_objects(&mut session, "scp://host/data", "linux", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].url, "scp://host/data/a.txt");
        assert_eq!(objects[0].kind, ObjectKind::Content);
        assert_eq!(objects[1].url, "scp://host/data/sub");
        assert!(objects[1].is_folder());
    }

    #[tokio::test]
    async fn test_list_single_file_keeps_url() {
        let mut session = session(&[(
            "ls -ltr --time-style=full-iso /data/a.txt",
            "-rw-r--r-- 1 u g 12 2018-01-02 10:00:00.000000000 +0000 /data/a.txt",
        )]);
        let objects = list_objects(&mut session, "/data/a.txt", "linux", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].url, "/data/a.txt");
        assert_eq!(objects[0].size, 12);
    }

    #[tokio::test]
    async fn test_list_falls_back_to_parent() {
        let mut session = session(&[
            ("ls -ltr --time-style=full-iso /data/a.txt", ""),
            (
                "ls -ltr --time-style=full-iso /data",
                "-rw-r--r-- 1 u g 12 2018-01-02 10:00:00.000000000 +0000 a.txt\n\
                 -rw-r--r-- 1 u g 99 2018-01-02 10:00:00.000000000 +0000 a.txt.bak",
            ),
        ]);
        let objects = list_objects(&mut session, "/data/a.txt", "linux", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].url, "/data/a.txt");
        assert_eq!(objects[0].size, 12);
    }

    #[tokio::test]
    async fn test_empty_folder_lists_nothing() {
        let mut session = session(&[
            ("ls -ltr --time-style=full-iso /data/empty", "total 0"),
            (
                "ls -ltr --time-style=full-iso /data",
                "drwxr-xr-x 2 u g 4096 2018-01-02 10:00:00.000000000 +0000 empty",
            ),
        ]);
        let objects = list_objects(&mut session, "/data/empty", "linux", TIMEOUT)
            .await
            .unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_find_object() {
        let mut session = session(&[(
            "ls -lTtr /data",
            "-rw-r--r--  1 user  group   414 Jun  8 14:14:08 2017 id_rsa.pub",
        )]);
        let object = find_object(&mut session, "/data/id_rsa.pub", "darwin", TIMEOUT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.url, "/data/id_rsa.pub");
        assert_eq!(object.modified.timestamp(), 1496931248);

        let root = find_object(&mut session, "/", "darwin", TIMEOUT)
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_folder());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let mut session = session(&[(
            "ls -ltr --time-style=full-iso /data",
            "ls: cannot access '/data': No such file or directory",
        )]);
        let object = find_object(&mut session, "/data/gone", "linux", TIMEOUT)
            .await
            .unwrap();
        assert!(object.is_none());
    }
}
