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

//! Helpers for `scp://host[:port]/path` URLs and plain remote paths.

/// The remote path addressed by `url`.
///
/// `scp://host:22/tmp/x` gives `/tmp/x`, `scp://host` gives `/`, and a plain
/// path is returned unchanged.
pub fn remote_path(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(index) => &rest[index..],
            None => "/",
        },
        None => url,
    }
}

/// Split `url` into its parent URL and last path segment.
///
/// Trailing slashes are ignored. The parent of a top-level entry is the
/// root (`/` for plain paths, the bare authority for URLs).
pub fn split(url: &str) -> (String, &str) {
    let trimmed = url.trim_end_matches('/');
    let authority_end = url.find("://").map(|index| index + 3).unwrap_or(0);
    match trimmed.rfind('/') {
        Some(index) if index >= authority_end => {
            let parent = &trimmed[..index];
            let parent = if authority_end == 0 && parent.is_empty() {
                "/".to_string()
            } else if authority_end > 0 && !parent[authority_end..].contains('/') {
                format!("{parent}/")
            } else {
                parent.to_string()
            };
            (parent, &trimmed[index + 1..])
        }
        _ if authority_end > 0 => (url.to_string(), ""),
        _ if url.starts_with('/') => ("/".to_string(), ""),
        _ => (String::new(), trimmed),
    }
}

/// Last path segment of `url`; empty for the root.
pub fn file_name(url: &str) -> &str {
    split(url).1
}

/// Quote `value` for a POSIX shell when it contains anything unusual.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path() {
        assert_eq!(remote_path("scp://host:22/tmp/x"), "/tmp/x");
        assert_eq!(remote_path("scp://host"), "/");
        assert_eq!(remote_path("scp://host/"), "/");
        assert_eq!(remote_path("/var/log"), "/var/log");
        assert_eq!(remote_path("relative/file"), "relative/file");
    }

    #[test]
    fn test_split_plain_paths() {
        assert_eq!(split("/tmp/file.txt"), ("/tmp".to_string(), "file.txt"));
        assert_eq!(split("/tmp/dir/"), ("/tmp".to_string(), "dir"));
        assert_eq!(split("/tmp"), ("/".to_string(), "tmp"));
        assert_eq!(split("/"), ("/".to_string(), ""));
        assert_eq!(split("file"), (String::new(), "file"));
    }

    #[test]
    fn test_split_urls() {
        assert_eq!(
            split("scp://host:22/tmp/file"),
            ("scp://host:22/tmp".to_string(), "file")
        );
        assert_eq!(split("scp://host/tmp"), ("scp://host/".to_string(), "tmp"));
        assert_eq!(split("scp://host"), ("scp://host".to_string(), ""));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/plain-name_1.txt"), "/tmp/plain-name_1.txt");
        assert_eq!(shell_quote("/tmp/with space"), "'/tmp/with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
