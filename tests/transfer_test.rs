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

use common::{session_config, transfer_config, FakeHost, MODIFIED_EPOCH};
use std::sync::Arc;
use sshrun::transfer::{CopyService, ObjectKind, StorageService, TransferError};

fn service(host: &FakeHost) -> CopyService {
    CopyService::new(Arc::new(host.clone()))
        .with_config(transfer_config())
        .with_session_config(session_config())
}

fn sample_host() -> FakeHost {
    let host = FakeHost::new();
    host.add_file("/data/a.txt", b"hello");
    host.add_file("/data/logs/app.log", b"line one\nline two\n");
    host.add_dir("/data/empty");
    host
}

#[tokio::test]
async fn test_list_directory() {
    let host = sample_host();
    let objects = service(&host).list("scp://fake:22/data").await.unwrap();

    let names: Vec<&str> = objects.iter().map(|o| o.name()).collect();
    assert_eq!(names, vec!["empty", "logs", "a.txt"]);
    assert!(objects[0].is_folder());
    assert_eq!(objects[2].url, "scp://fake:22/data/a.txt");
    assert_eq!(objects[2].kind, ObjectKind::Content);
    assert_eq!(objects[2].size, 5);
    assert_eq!(objects[2].modified.timestamp(), MODIFIED_EPOCH);
}

#[tokio::test]
async fn test_list_file_returns_itself() {
    let host = sample_host();
    let objects = service(&host).list("scp://fake:22/data/a.txt").await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].url, "scp://fake:22/data/a.txt");
    assert_eq!(objects[0].size, 5);
}

#[tokio::test]
async fn test_list_missing_and_empty() {
    let host = sample_host();
    let storage = service(&host);
    assert!(storage.list("/data/nope").await.unwrap().is_empty());
    assert!(storage.list("/data/empty").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_object_lookup() {
    let host = sample_host();
    let storage = service(&host);

    let file = storage.object("/data/a.txt").await.unwrap().unwrap();
    assert_eq!(file.kind, ObjectKind::Content);
    assert_eq!(file.url, "/data/a.txt");

    let folder = storage.object("/data/logs").await.unwrap().unwrap();
    assert!(folder.is_folder());

    assert!(storage.object("/data/missing").await.unwrap().is_none());
    assert!(!storage.exists("/data/missing").await.unwrap());
    assert!(storage.exists("/").await.unwrap());
}

#[tokio::test]
async fn test_download() {
    let host = sample_host();
    let storage = service(&host);
    let object = storage.object("/data/logs/app.log").await.unwrap().unwrap();
    let data = storage.download(&object).await.unwrap();
    assert_eq!(data, b"line one\nline two\n");
    assert!(host.log().contains(&"cat /data/logs/app.log".to_string()));
}

#[tokio::test]
async fn test_download_missing_file_fails() {
    let host = sample_host();
    let storage = service(&host);
    let mut object = storage.object("/data/a.txt").await.unwrap().unwrap();
    object.url = "/data/gone.txt".to_string();
    let err = storage.download(&object).await.unwrap_err();
    assert!(matches!(err, TransferError::Remote(ref msg) if msg.contains("No such file")));
}

#[tokio::test]
async fn test_upload_creates_parent() {
    let host = sample_host();
    let storage = service(&host);
    let payload = vec![b'x'; 100];

    storage
        .upload("scp://fake:22/srv/new/blob.bin", &payload)
        .await
        .unwrap();

    assert_eq!(host.file("/srv/new/blob.bin"), Some(payload));
    assert!(host.has_dir("/srv/new"));
    assert!(host.log().contains(&"mkdir -p /srv/new".to_string()));
    assert!(host.log().contains(&"scp -qt /srv/new".to_string()));
}

#[tokio::test]
async fn test_upload_without_name_fails() {
    let host = sample_host();
    assert!(service(&host).upload("/", b"data").await.is_err());
}

#[tokio::test]
async fn test_delete() {
    let host = sample_host();
    let storage = service(&host);

    let logs = storage.object("/data/logs").await.unwrap().unwrap();
    storage.delete(&logs).await.unwrap();
    assert!(host.file("/data/logs/app.log").is_none());
    assert!(!host.has_dir("/data/logs"));
    assert!(host.file("/data/a.txt").is_some());
}

#[tokio::test]
async fn test_delete_root_is_refused() {
    let host = sample_host();
    let storage = service(&host);
    let root = storage.object("scp://fake:22/").await.unwrap().unwrap();
    let err = storage.delete(&root).await.unwrap_err();
    assert!(matches!(err, TransferError::RootDelete(_)));
    assert!(!host.log().iter().any(|line| line.starts_with("rm ")));
}

#[tokio::test]
async fn test_download_retries_short_read() {
    let host = sample_host();
    let mut config = transfer_config();
    config.verify_threshold = 4;
    let storage = service(&host).with_config(config);
    let object = storage.object("/data/a.txt").await.unwrap().unwrap();

    host.short_reads(1);
    assert_eq!(storage.download(&object).await.unwrap(), b"hello");

    host.short_reads(2);
    let err = storage.download(&object).await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::SizeMismatch { expected: 5, actual: 2, .. }
    ));
}

#[tokio::test]
async fn test_small_download_is_not_verified() {
    let host = sample_host();
    let storage = service(&host);
    let object = storage.object("/data/a.txt").await.unwrap().unwrap();
    host.short_reads(1);
    assert_eq!(storage.download(&object).await.unwrap(), b"he");
}

#[tokio::test]
async fn test_upload_retries_short_write() {
    let host = sample_host();
    let mut config = transfer_config();
    config.verify_threshold = 4;
    let storage = service(&host).with_config(config);
    let payload = b"0123456789".to_vec();

    host.short_writes(1);
    storage.upload("/data/b.bin", &payload).await.unwrap();
    assert_eq!(host.file("/data/b.bin"), Some(payload.clone()));

    host.short_writes(2);
    let err = storage.upload("/data/c.bin", &payload).await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::SizeMismatch { expected: 10, actual: 5, .. }
    ));
}

#[tokio::test]
async fn test_upload_then_download_returns_same_bytes() {
    let host = sample_host();
    let storage = service(&host);
    let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();

    storage.upload("scp://fake:22/srv/blob.bin", &payload).await.unwrap();
    let object = storage
        .object("scp://fake:22/srv/blob.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(object.size, payload.len() as u64);
    assert_eq!(storage.download(&object).await.unwrap(), payload);
}

#[tokio::test]
async fn test_upload_refuses_name_with_newline() {
    let host = sample_host();
    let err = service(&host)
        .upload("/data/bad\nname", b"data")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Scp(_)));
    assert!(!host.log().iter().any(|line| line.starts_with("scp ")));
}
