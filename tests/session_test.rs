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

use common::{session_config, FakeHost};
use std::time::Duration;
use sshrun::session::{CommandSession, SessionError, ShellSession, Terminator};
use sshrun::ssh::ShellRequest;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn open(host: &FakeHost) -> ShellSession {
    ShellSession::open(host, &ShellRequest::default(), session_config())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_prompt_is_learned_after_banner() {
    let host = FakeHost::new();
    let mut session = open(&host).await;
    assert_eq!(session.prompt(), "$");
    assert_eq!(session.system().await.unwrap(), "linux");
    // Cached after the first query.
    assert_eq!(session.system().await.unwrap(), "linux");
    assert_eq!(host.log().iter().filter(|l| *l == "uname -s").count(), 1);
    session.close().await;
}

#[tokio::test]
async fn test_commands_run_in_order() {
    let host = FakeHost::new();
    let mut session = open(&host).await;
    for word in ["alpha", "beta", "gamma"] {
        let output = session
            .run(&format!("echo {word}"), &[], TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output, word);
    }
    assert_eq!(session.run("mkdir -p /tmp/x", &[], TIMEOUT).await.unwrap(), "");
    session.close().await;
}

#[tokio::test]
async fn test_custom_terminator() {
    let host = FakeHost::new();
    let mut session = open(&host).await;
    let output = session
        .run("echo build ok", &[Terminator::parse("ok")], TIMEOUT)
        .await
        .unwrap();
    assert!(output.starts_with("build ok"));
    session.close().await;
}

#[tokio::test]
async fn test_stderr_fails_command() {
    let host = FakeHost::new();
    let mut session = open(&host).await;
    let err = session.run("frobnicate", &[], TIMEOUT).await.unwrap_err();
    assert!(matches!(err, SessionError::Remote(ref msg) if msg.contains("command not found")));

    // The session stays usable.
    assert_eq!(session.run("echo still", &[], TIMEOUT).await.unwrap(), "still");
    session.close().await;
}

#[tokio::test]
async fn test_closed_session_refuses_commands() {
    let host = FakeHost::new();
    let mut session = open(&host).await;
    session.close().await;
    session.close().await;
    assert!(!session.is_running());
    assert!(matches!(
        session.run("echo late", &[], TIMEOUT).await,
        Err(SessionError::Closed)
    ));
}
