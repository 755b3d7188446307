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

//! Recorded command/output pairs and their on-disk form.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

const STDIN_SUFFIX: &str = ".stdin";
const STDOUT_SUFFIX: &str = ".stdout";
const STDERR_SUFFIX: &str = ".stderr";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to access replay file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("replay group {0:03} has outputs but no stdin file")]
    MissingStdin(u32),
}

/// One recorded answer: raw stdout, plus stderr when the command failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RecordedOutput {
    stdout: Vec<u8>,
    stderr: Option<String>,
}

/// Outputs recorded for one command, with the replay cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RecordedCommand {
    outputs: Vec<RecordedOutput>,
    cursor: usize,
}

#[derive(Debug, Default)]
struct ReplayState {
    /// Registration order of keys, used for stable file numbering.
    keys: Vec<String>,
    commands: HashMap<String, RecordedCommand>,
}

/// A set of recorded command/output pairs bound to a directory.
///
/// Each distinct command keeps its outputs in registration order. `next`
/// hands them back one by one and returns an empty string once they run out.
/// Callers must treat an empty answer as "nothing recorded".
#[derive(Debug)]
pub struct ReplayCommands {
    base_dir: PathBuf,
    state: Mutex<ReplayState>,
}

/// Commands are keyed with exactly the text written to the shell.
fn normalize_key(input: &str) -> String {
    if input.ends_with('\n') {
        input.to_string()
    } else {
        format!("{input}\n")
    }
}

impl ReplayCommands {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Create a set and populate it from `base_dir`.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, ReplayError> {
        let commands = Self::new(base_dir);
        commands.load().await?;
        Ok(commands)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        // A panic while holding the lock cannot leave the state half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `output` to the outputs recorded for `input`.
    ///
    /// The bytes are kept as given, so binary payloads replay unchanged.
    pub fn register(&self, input: &str, output: impl AsRef<[u8]>) {
        self.push(
            input,
            RecordedOutput {
                stdout: output.as_ref().to_vec(),
                stderr: None,
            },
        );
    }

    /// Record a run of `input` that wrote `stderr`; replay fails it again.
    pub fn register_failure(&self, input: &str, stdout: impl AsRef<[u8]>, stderr: &str) {
        self.push(
            input,
            RecordedOutput {
                stdout: stdout.as_ref().to_vec(),
                stderr: Some(stderr.to_string()),
            },
        );
    }

    fn push(&self, input: &str, output: RecordedOutput) {
        let key = normalize_key(input);
        let mut state = self.lock();
        if !state.commands.contains_key(&key) {
            state.keys.push(key.clone());
        }
        state
            .commands
            .entry(key)
            .or_default()
            .outputs
            .push(output);
    }

    fn next_output(&self, input: &str) -> Option<RecordedOutput> {
        let key = normalize_key(input);
        let mut state = self.lock();
        match state.commands.get_mut(&key) {
            Some(command) if command.cursor < command.outputs.len() => {
                let output = command.outputs[command.cursor].clone();
                command.cursor += 1;
                Some(output)
            }
            _ => None,
        }
    }

    /// Next recorded output for `input` as text, or an empty string when exhausted.
    pub fn next(&self, input: &str) -> String {
        self.next_output(input)
            .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
            .unwrap_or_default()
    }

    /// Next recorded output for `input` as raw bytes, empty when exhausted.
    pub fn next_bytes(&self, input: &str) -> Vec<u8> {
        self.next_output(input)
            .map(|output| output.stdout)
            .unwrap_or_default()
    }

    /// Next recorded outcome for `input`: the stdout text, or the stderr of a
    /// recorded failure. Exhausted commands answer `Ok` with an empty string.
    pub fn next_outcome(&self, input: &str) -> Result<String, String> {
        match self.next_output(input) {
            Some(RecordedOutput {
                stderr: Some(stderr),
                ..
            }) => Err(stderr),
            Some(output) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            None => Ok(String::new()),
        }
    }

    /// True when `input` was ever registered, exhausted or not.
    pub fn contains(&self, input: &str) -> bool {
        self.lock().commands.contains_key(&normalize_key(input))
    }

    /// Registered command keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys.clone()
    }

    /// All outputs recorded for `input`, ignoring the cursor.
    pub fn outputs(&self, input: &str) -> Vec<String> {
        self.lock()
            .commands
            .get(&normalize_key(input))
            .map(|c| {
                c.outputs
                    .iter()
                    .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rewind every cursor to the first output.
    pub fn rewind(&self) {
        for command in self.lock().commands.values_mut() {
            command.cursor = 0;
        }
    }

    /// Write `NNN_000.stdin` and `NNN_KKK.stdout` files for every command,
    /// plus `NNN_KKK.stderr` for recorded failures.
    ///
    /// Replay files already in the directory are replaced.
    pub async fn store(&self) -> Result<(), ReplayError> {
        let snapshot: Vec<(String, Vec<RecordedOutput>)> = {
            let state = self.lock();
            state
                .keys
                .iter()
                .map(|key| {
                    let outputs = state
                        .commands
                        .get(key)
                        .map(|c| c.outputs.clone())
                        .unwrap_or_default();
                    (key.clone(), outputs)
                })
                .collect()
        };

        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|source| self.io_error(&self.base_dir, source))?;
        self.remove_replay_files().await?;

        for (seq, (key, outputs)) in snapshot.iter().enumerate() {
            let stdin_path = self.base_dir.join(format!("{seq:03}_000{STDIN_SUFFIX}"));
            fs::write(&stdin_path, key)
                .await
                .map_err(|source| self.io_error(&stdin_path, source))?;
            for (index, output) in outputs.iter().enumerate() {
                let stdout_path = self
                    .base_dir
                    .join(format!("{seq:03}_{index:03}{STDOUT_SUFFIX}"));
                fs::write(&stdout_path, &output.stdout)
                    .await
                    .map_err(|source| self.io_error(&stdout_path, source))?;
                if let Some(stderr) = &output.stderr {
                    let stderr_path = self
                        .base_dir
                        .join(format!("{seq:03}_{index:03}{STDERR_SUFFIX}"));
                    fs::write(&stderr_path, stderr)
                        .await
                        .map_err(|source| self.io_error(&stderr_path, source))?;
                }
            }
        }
        debug!(
            "Stored {} replay commands in {}",
            snapshot.len(),
            self.base_dir.display()
        );
        Ok(())
    }

    /// Read replay files from the directory, appending to what is registered.
    ///
    /// Files sharing a numeric prefix form one command; groups load in
    /// prefix order and outputs in index order.
    pub async fn load(&self) -> Result<(), ReplayError> {
        let groups = self.read_groups().await?;
        let count = groups.len();
        for (seq, group) in groups {
            let stdin_path = group.stdin.ok_or(ReplayError::MissingStdin(seq))?;
            let input = fs::read_to_string(&stdin_path)
                .await
                .map_err(|source| self.io_error(&stdin_path, source))?;
            let indices: BTreeSet<u32> = group
                .stdout
                .keys()
                .chain(group.stderr.keys())
                .copied()
                .collect();
            for index in indices {
                let stdout = match group.stdout.get(&index) {
                    Some(path) => fs::read(path)
                        .await
                        .map_err(|source| self.io_error(path, source))?,
                    None => Vec::new(),
                };
                let stderr = match group.stderr.get(&index) {
                    Some(path) => Some(
                        fs::read_to_string(path)
                            .await
                            .map_err(|source| self.io_error(path, source))?,
                    ),
                    None => None,
                };
                self.push(&input, RecordedOutput { stdout, stderr });
            }
        }
        debug!(
            "Loaded {} replay commands from {}",
            count,
            self.base_dir.display()
        );
        Ok(())
    }

    async fn read_groups(&self) -> Result<BTreeMap<u32, FileGroup>, ReplayError> {
        let mut groups: BTreeMap<u32, FileGroup> = BTreeMap::new();
        let mut dir = fs::read_dir(&self.base_dir)
            .await
            .map_err(|source| self.io_error(&self.base_dir, source))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|source| self.io_error(&self.base_dir, source))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(replay_file) = ReplayFile::parse(name) else {
                continue;
            };
            let group = groups.entry(replay_file.seq).or_default();
            match replay_file.kind {
                ReplayFileKind::Stdin => group.stdin = Some(entry.path()),
                ReplayFileKind::Stdout(index) => {
                    group.stdout.insert(index, entry.path());
                }
                ReplayFileKind::Stderr(index) => {
                    group.stderr.insert(index, entry.path());
                }
            }
        }
        Ok(groups)
    }

    async fn remove_replay_files(&self) -> Result<(), ReplayError> {
        for group in self.read_groups().await?.into_values() {
            for path in group
                .stdin
                .iter()
                .chain(group.stdout.values())
                .chain(group.stderr.values())
            {
                fs::remove_file(path)
                    .await
                    .map_err(|source| self.io_error(path, source))?;
            }
        }
        Ok(())
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> ReplayError {
        ReplayError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
struct FileGroup {
    stdin: Option<PathBuf>,
    stdout: BTreeMap<u32, PathBuf>,
    stderr: BTreeMap<u32, PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum ReplayFileKind {
    Stdin,
    Stdout(u32),
    Stderr(u32),
}

#[derive(Debug, PartialEq, Eq)]
struct ReplayFile {
    seq: u32,
    kind: ReplayFileKind,
}

impl ReplayFile {
    /// Recognize `NNN_KKK.stdin`, `.stdout` and `.stderr` file names.
    fn parse(name: &str) -> Option<Self> {
        let (stem, suffix) = [STDIN_SUFFIX, STDOUT_SUFFIX, STDERR_SUFFIX]
            .into_iter()
            .find_map(|suffix| name.strip_suffix(suffix).map(|stem| (stem, suffix)))?;
        let (seq, index) = stem.split_once('_')?;
        let seq = seq.parse().ok()?;
        let index = index.parse().ok()?;
        let kind = match suffix {
            STDIN_SUFFIX => ReplayFileKind::Stdin,
            STDOUT_SUFFIX => ReplayFileKind::Stdout(index),
            _ => ReplayFileKind::Stderr(index),
        };
        Some(Self { seq, kind })
    }
}
