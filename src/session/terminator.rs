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

//! Patterns that mark the end of a command's output.

/// A pattern used to decide that a command has finished printing.
///
/// Textual form: `^X` anchors at the start, `X$` anchors at the end, anything
/// else matches as a substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Terminator {
    /// Parse the textual form of a terminator.
    ///
    /// A bare `^` or `$` has nothing to anchor and is taken literally.
    pub fn parse(pattern: &str) -> Self {
        if let Some(rest) = pattern.strip_prefix('^') {
            if !rest.is_empty() {
                return Self::Prefix(rest.to_string());
            }
        }
        if let Some(rest) = pattern.strip_suffix('$') {
            if !rest.is_empty() {
                return Self::Suffix(rest.to_string());
            }
        }
        Self::Contains(pattern.to_string())
    }

    /// Literal match, used for the learned prompt which may itself end in `$`.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn matches(&self, output: &str) -> bool {
        match self {
            Self::Prefix(x) => output.starts_with(x.as_str()),
            Self::Suffix(x) => output.ends_with(x.as_str()),
            Self::Contains(x) => output.contains(x.as_str()),
        }
    }
}

impl From<&str> for Terminator {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

/// True when any of `terminators` matches `output`.
pub fn has_terminator(output: &str, terminators: &[Terminator]) -> bool {
    terminators.iter().any(|t| t.matches(output))
}
