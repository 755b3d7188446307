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

mod common;

use common::{session_config, transfer_config, FakeHost};
use std::sync::Arc;
use sshrun::commands::{download, list, remove, upload};
use sshrun::transfer::CopyService;

fn service(host: &FakeHost) -> CopyService {
    CopyService::new(Arc::new(host.clone()))
        .with_config(transfer_config())
        .with_session_config(session_config())
}

#[tokio::test]
async fn test_download_into_directory() {
    let host = FakeHost::new();
    host.add_file("/etc/motd", b"welcome\n");
    let local = tempfile::tempdir().unwrap();

    let (path, size) = download::download_file(&service(&host), "/etc/motd", Some(local.path()))
        .await
        .unwrap();
    assert_eq!(path, local.path().join("motd"));
    assert_eq!(size, 8);
    assert_eq!(std::fs::read(&path).unwrap(), b"welcome\n");
}

#[tokio::test]
async fn test_download_rejects_folders_and_missing_files() {
    let host = FakeHost::new();
    host.add_dir("/var/log");
    let local = tempfile::tempdir().unwrap();
    let storage = service(&host);

    let err = download::download_file(&storage, "/var/log", Some(local.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is a directory"));

    let err = download::download_file(&storage, "/var/missing", Some(local.path()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such file"));
}

#[tokio::test]
async fn test_upload_to_directory_url_appends_name() {
    let host = FakeHost::new();
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("report.csv");
    std::fs::write(&source, b"a,b\n1,2\n").unwrap();

    let (url, size) = upload::upload_file(&service(&host), &source, "/srv/reports/")
        .await
        .unwrap();
    assert_eq!(url, "/srv/reports/report.csv");
    assert_eq!(size, 8);
    assert_eq!(host.file("/srv/reports/report.csv"), Some(b"a,b\n1,2\n".to_vec()));
}

#[tokio::test]
async fn test_list_and_remove() {
    let host = FakeHost::new();
    host.add_file("/tmp/work/one.txt", b"1");
    host.add_file("/tmp/work/two.txt", b"22");
    let storage = service(&host);

    let objects = list::list_objects(&storage, "/tmp/work").await.unwrap();
    assert_eq!(objects.len(), 2);
    let text = list::format_listing(&objects, false);
    assert!(text.contains("one.txt"));
    assert!(text.contains("two.txt"));

    remove::remove(&storage, "/tmp/work/one.txt").await.unwrap();
    assert!(host.file("/tmp/work/one.txt").is_none());
    tokio_test::assert_err!(remove::remove(&storage, "/tmp/work/one.txt").await);
    tokio_test::assert_err!(remove::remove(&storage, "/").await);
}
