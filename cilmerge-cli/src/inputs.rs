//! Input paths and the option files they point to.

use std::path::{Path, PathBuf};

use cilmerge::Error;
use regex::Regex;

fn has_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

fn wildcard_regex(pattern: &str) -> cilmerge::Result<Regex> {
    let mut expression = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Expand `*` and `?` in the file name of every input. Matches of one pattern are sorted;
/// a pattern without matches is an input access error.
pub fn expand(inputs: &[PathBuf], wildcards: bool) -> cilmerge::Result<Vec<PathBuf>> {
    let mut expanded = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !wildcards || !has_wildcard(&name) {
            expanded.push(input.clone());
            continue;
        }

        let directory = match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let pattern = wildcard_regex(&name)?;
        let entries = std::fs::read_dir(&directory).map_err(|source| Error::Io {
            path: directory.clone(),
            source,
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Io {
                path: directory.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if pattern.is_match(&file_name) && entry.path().is_file() {
                matches.push(directory.join(file_name));
            }
        }

        if matches.is_empty() {
            return Err(Error::Io {
                path: input.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        matches.sort();
        log::debug!("{} expands to {} inputs", input.display(), matches.len());
        expanded.extend(matches);
    }
    Ok(expanded)
}

pub fn read_bytes(path: &Path) -> cilmerge::Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_text(path: &Path) -> cilmerge::Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
