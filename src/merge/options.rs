//! Configuration of a merge.

use std::{collections::HashMap, path::PathBuf};

use regex::Regex;
use strum::{Display, EnumString};

use crate::{
    collaborators::{HashAlgorithm, SigningKey},
    Error, Result,
};

/// What happens when two inputs define a visible type with the same full name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Abort the merge with [`Error::DuplicateType`]
    #[default]
    Error,
    /// Rename later definitions by appending `_<n>`
    AutoRename,
    /// Treat same-named types as one type whose members are the union of all definitions
    Union,
}

/// A four-part version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub [u16; 4]);

impl std::str::FromStr for Version {
    type Err = Error;

    fn from_str(text: &str) -> Result<Version> {
        let mut parts = [0_u16; 4];
        let mut count = 0;
        for part in text.trim().split('.') {
            if count == 4 {
                return Err(Error::Configuration(format!("version '{text}' has more than four parts")));
            }
            parts[count] = part
                .parse()
                .map_err(|_| Error::Configuration(format!("invalid version '{text}'")))?;
            count += 1;
        }
        Ok(Version(parts))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [major, minor, build, revision] = self.0;
        write!(f, "{major}.{minor}.{build}.{revision}")
    }
}

/// Options of [`crate::merge::merge`]
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Handling of duplicate visible type names
    pub duplicates: DuplicatePolicy,
    /// Explicit new names for duplicate types, by original full name
    pub renames: HashMap<String, String>,
    /// Make the types of every input but the primary one internal
    pub internalize: bool,
    /// If not empty, only types matching one of these are internalized
    pub internalize_include: Vec<Regex>,
    /// Types matching one of these are never internalized
    pub internalize_exclude: Vec<Regex>,
    /// Copy the assembly-level attributes of every input, not only the primary one
    pub copy_attributes: bool,
    /// Keep every copy of same-named manifest resources
    pub allow_duplicate_resources: bool,
    /// The inputs were closed over their references
    pub closed: bool,
    /// Run independent per-input work on the rayon pool
    pub parallel: bool,
    /// Name of the target assembly; the primary input's if `None`
    pub target_assembly_name: Option<String>,
    /// Name of the target module; the primary input's if `None`
    pub target_module_name: Option<String>,
    /// Version of the target assembly; the primary input's if `None`
    pub version: Option<Version>,
    /// Strong-name key of the target assembly
    pub key: Option<SigningKey>,
    /// Hash algorithm of the target assembly; the primary input's if `None`
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Point retargetable references at the framework assembly found in the search directories
    pub fix_retargetable: bool,
    /// Directories searched for referenced framework assemblies
    pub search_directories: Vec<PathBuf>,
    /// Produce debug information through the PDB collaborator
    pub debug_info: bool,
    /// Merge documentation through the XML documentation collaborator
    pub xml_docs: bool,
}

impl MergeOptions {
    /// Set the duplicate type policy
    #[must_use]
    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Shortcut for [`DuplicatePolicy::Union`]
    #[must_use]
    pub fn union(self, union: bool) -> Self {
        self.duplicates(if union {
            DuplicatePolicy::Union
        } else {
            DuplicatePolicy::Error
        })
    }

    /// Use an explicit rename mapping for duplicate types
    #[must_use]
    pub fn renames(mut self, renames: HashMap<String, String>) -> Self {
        self.renames = renames;
        self
    }

    /// Internalize the types of the non-primary inputs
    #[must_use]
    pub fn internalize(mut self, internalize: bool) -> Self {
        self.internalize = internalize;
        self
    }

    /// Restrict internalization to matching types
    #[must_use]
    pub fn internalize_include(mut self, patterns: Vec<Regex>) -> Self {
        self.internalize_include = patterns;
        self
    }

    /// Exclude matching types from internalization
    #[must_use]
    pub fn internalize_exclude(mut self, patterns: Vec<Regex>) -> Self {
        self.internalize_exclude = patterns;
        self
    }

    /// Copy the assembly-level attributes of every input
    #[must_use]
    pub fn copy_attributes(mut self, copy: bool) -> Self {
        self.copy_attributes = copy;
        self
    }

    /// Keep duplicate manifest resources
    #[must_use]
    pub fn allow_duplicate_resources(mut self, allow: bool) -> Self {
        self.allow_duplicate_resources = allow;
        self
    }

    /// Mark the input set as closed over its references
    #[must_use]
    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }

    /// Enable the parallel fan-out over inputs
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Override the target assembly name
    #[must_use]
    pub fn target_assembly_name(mut self, name: impl Into<String>) -> Self {
        self.target_assembly_name = Some(name.into());
        self
    }

    /// Override the target module name
    #[must_use]
    pub fn target_module_name(mut self, name: impl Into<String>) -> Self {
        self.target_module_name = Some(name.into());
        self
    }

    /// Override the target assembly version
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Strong-name the target with `key`
    #[must_use]
    pub fn key(mut self, key: SigningKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Override the hash algorithm
    #[must_use]
    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = Some(algorithm);
        self
    }

    /// Fix up retargetable references against the search directories
    #[must_use]
    pub fn fix_retargetable(mut self, fix: bool) -> Self {
        self.fix_retargetable = fix;
        self
    }

    /// Add a directory searched for framework assemblies
    #[must_use]
    pub fn search_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.search_directories.push(directory.into());
        self
    }

    /// Produce merged debug information
    #[must_use]
    pub fn debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Merge XML documentation
    #[must_use]
    pub fn xml_docs(mut self, enabled: bool) -> Self {
        self.xml_docs = enabled;
        self
    }
}

/// Parse a rename mapping file: one `old=new` pair of full type names per line.
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Errors
/// Returns [`Error::InvalidRenameMapping`] for a line without `=`, with an empty side, or
/// naming the same type twice
pub fn parse_rename_mapping(text: &str) -> Result<HashMap<String, String>> {
    let mut renames = HashMap::new();
    for (number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let invalid = || Error::InvalidRenameMapping {
            line: number + 1,
            content: line.to_string(),
        };
        let (old, new) = trimmed.split_once('=').ok_or_else(invalid)?;
        let (old, new) = (old.trim(), new.trim());
        if old.is_empty() || new.is_empty() || new.contains('=') {
            return Err(invalid());
        }
        if renames.insert(old.to_string(), new.to_string()).is_some() {
            return Err(invalid());
        }
    }
    Ok(renames)
}

/// Compile a pattern file: one regular expression per non-blank line.
///
/// # Errors
/// Returns [`Error::InvalidPattern`] for the first pattern that does not compile
pub fn compile_patterns(text: &str) -> Result<Vec<Regex>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_mapping() {
        let renames = parse_rename_mapping("# comment\nN.C = N.C2\n\nOther=Renamed\n").unwrap();
        assert_eq!(renames.len(), 2);
        assert_eq!(renames["N.C"], "N.C2");
        assert_eq!(renames["Other"], "Renamed");

        match parse_rename_mapping("A=B\nbroken line\n") {
            Err(Error::InvalidRenameMapping { line, content }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "broken line");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_rename_mapping("A=").is_err());
        assert!(parse_rename_mapping("A=B\nA=C").is_err());
    }

    #[test]
    fn patterns() {
        let patterns = compile_patterns("^N\\.\n\n\\[Lib\\].*\n").unwrap();
        assert_eq!(patterns.len(), 2);
        assert!(patterns[0].is_match("N.C"));
        assert!(matches!(
            compile_patterns("(unclosed"),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn versions_and_policies() {
        let version: Version = "1.2.3".parse().unwrap();
        assert_eq!(version, Version([1, 2, 3, 0]));
        assert_eq!(version.to_string(), "1.2.3.0");
        assert!("1.2.3.4.5".parse::<Version>().is_err());
        assert!("1.x".parse::<Version>().is_err());

        assert_eq!("auto-rename".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::AutoRename);
        let options = MergeOptions::default().union(true).internalize(true);
        assert_eq!(options.duplicates, DuplicatePolicy::Union);
        assert!(options.internalize);
    }
}
