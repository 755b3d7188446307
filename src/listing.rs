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

//! Parser for `ls -l` style directory listings.
//!
//! Two positional layouts are understood:
//!
//! ```text
//! ISO (GNU ls --time-style=full-iso):
//! -rw-r--r-- 1 user group 2002 2017-11-04 22:29:33.363458941 +0000 aerospike.conf
//!
//! Legacy (BSD ls -lT):
//! -rw-r--r--  1 user  group   414 Jun  8 14:14:08 2017 id_rsa.pub
//! ```
//!
//! Fields are split by a small scanner that moves to the next field once per
//! run of whitespace. The last field (the name) takes the remainder of the
//! line verbatim, so names containing spaces survive.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Longest prefix of the time-of-day field that is parsed (`HH:MM:SS.fff`).
const MAX_TIME_FIELD_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("malformed listing line '{line}'")]
    Malformed { line: String },

    #[error("invalid size '{value}' in listing line '{line}'")]
    InvalidSize { line: String, value: String },

    #[error("invalid modification time '{value}' in listing line '{line}'")]
    InvalidTime { line: String, value: String },
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub url: String,
    pub permission: String,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub name: String,
    pub is_dir: bool,
}

/// Positional layout of a listing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    Iso,
    Legacy,
}

mod iso {
    pub const PERMISSION: usize = 0;
    pub const OWNER: usize = 2;
    pub const GROUP: usize = 3;
    pub const SIZE: usize = 4;
    pub const DATE: usize = 5;
    pub const TIME: usize = 6;
    pub const TIMEZONE: usize = 7;
    pub const NAME: usize = 8;
}

mod legacy {
    pub const PERMISSION: usize = 0;
    pub const OWNER: usize = 2;
    pub const GROUP: usize = 3;
    pub const SIZE: usize = 4;
    pub const MONTH: usize = 5;
    pub const DAY: usize = 6;
    pub const TIME: usize = 7;
    pub const YEAR: usize = 8;
    pub const NAME: usize = 9;
}

impl ListingFormat {
    /// Detect the layout from the sixth column: ISO dates look like `YYYY-MM-DD`.
    pub fn detect(line: &str) -> Self {
        match line.split_whitespace().nth(iso::DATE) {
            Some(date) if is_iso_date(date) => Self::Iso,
            _ => Self::Legacy,
        }
    }

    fn name_index(self) -> usize {
        match self {
            Self::Iso => iso::NAME,
            Self::Legacy => legacy::NAME,
        }
    }
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

/// Split `line` into `last + 1` fields.
///
/// The field index advances when the first non-blank character after a run
/// of whitespace is seen; a run never advances it more than once. Once the
/// last field is reached, whitespace is kept as part of it.
fn scan_fields(line: &str, last: usize) -> Vec<String> {
    let mut fields = vec![String::new(); last + 1];
    let mut index = 0;
    let mut in_gap = false;

    for ch in line.trim().chars() {
        if index < last && ch.is_whitespace() {
            in_gap = true;
            continue;
        }
        if in_gap {
            index += 1;
            in_gap = false;
        }
        fields[index].push(ch);
    }
    fields
}

/// Parse the output of `ls -l` into file entries.
///
/// When `is_directory` is set, entry URLs are `base_url` joined with the
/// entry name; otherwise the listing describes `base_url` itself.
/// Output reporting a missing path yields an empty list.
pub fn parse_listing(
    base_url: &str,
    stdout: &str,
    is_directory: bool,
) -> Result<Vec<FileEntry>, ListingError> {
    if stdout.to_lowercase().contains("no such file or directory") {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("total ") || line == "total" {
            continue;
        }
        let mut entry = parse_line(line)?;
        entry.url = if is_directory {
            join_url(base_url, &entry.name)
        } else {
            base_url.to_string()
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Parse a single listing line; the returned entry has an empty URL.
pub fn parse_line(line: &str) -> Result<FileEntry, ListingError> {
    let format = ListingFormat::detect(line);
    let fields = scan_fields(line, format.name_index());

    let (permission, owner, group, size, modified_raw) = match format {
        ListingFormat::Iso => (
            &fields[iso::PERMISSION],
            &fields[iso::OWNER],
            &fields[iso::GROUP],
            &fields[iso::SIZE],
            format!(
                "{} {} {}",
                fields[iso::DATE],
                truncate_time(&fields[iso::TIME]),
                fields[iso::TIMEZONE]
            ),
        ),
        ListingFormat::Legacy => (
            &fields[legacy::PERMISSION],
            &fields[legacy::OWNER],
            &fields[legacy::GROUP],
            &fields[legacy::SIZE],
            format!(
                "{} {} {} {}",
                fields[legacy::MONTH],
                fields[legacy::DAY],
                truncate_time(&fields[legacy::TIME]),
                fields[legacy::YEAR]
            ),
        ),
    };

    let raw_name = &fields[format.name_index()];
    if raw_name.is_empty() {
        return Err(ListingError::Malformed {
            line: line.to_string(),
        });
    }

    let size = size.parse::<u64>().map_err(|_| ListingError::InvalidSize {
        line: line.to_string(),
        value: size.clone(),
    })?;

    let modified = parse_time(format, &modified_raw).ok_or_else(|| ListingError::InvalidTime {
        line: line.to_string(),
        value: modified_raw.clone(),
    })?;

    // Symbolic links print as `name -> target`.
    let name = if permission.starts_with('l') {
        raw_name
            .split_once(" -> ")
            .map(|(name, _)| name)
            .unwrap_or(raw_name)
            .to_string()
    } else {
        raw_name.clone()
    };

    Ok(FileEntry {
        url: String::new(),
        is_dir: permission.starts_with('d'),
        permission: permission.clone(),
        owner: owner.clone(),
        group: group.clone(),
        size,
        modified,
        name,
    })
}

fn truncate_time(time: &str) -> &str {
    match time.char_indices().nth(MAX_TIME_FIELD_LEN) {
        Some((index, _)) => &time[..index],
        None => time,
    }
}

fn parse_time(format: ListingFormat, value: &str) -> Option<DateTime<Utc>> {
    match format {
        ListingFormat::Iso => DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f %z")
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        ListingFormat::Legacy => ["%b %d %H:%M:%S %Y", "%b %d %H:%M %Y"]
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
            .map(|t| t.and_utc()),
    }
}

/// Join a URL (or plain path) and a child name with exactly one slash.
pub fn join_url(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        name.trim_start_matches('/')
    )
}
