use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::tables::{CodedIndexType, TableId, TableIndex};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Format errors
/// - [`Error::Malformed`] - Corrupted metadata (bad bitmask, coded index, heap offset, ...)
/// - [`Error::OutOfBounds`] - A read went beyond the end of the buffer
/// - [`Error::InvalidCodedIndex`] - A table index outside of a coded index's permitted set
/// - [`Error::MissingSchema`] - A present table kind has no registered descriptor
/// - [`Error::UnresolvedRawData`] - A merge input still points into an image it was read without
///
/// ## I/O errors
/// - [`Error::Io`] - An input resource could not be read
/// - [`Error::TargetAccess`] - The output could not be written
///
/// ## Policy violations
/// - [`Error::DuplicateType`], [`Error::GenericParameterMismatch`], [`Error::NotIlOnly`],
///   [`Error::InvalidRenameMapping`], [`Error::Configuration`], ...
///
/// Every variant maps onto one [`ExitCode`] through [`Error::exit_code`].
///
/// # Examples
///
/// ```rust
/// use cilmerge::{Error, ExitCode};
///
/// let error = Error::DuplicateType("N.C".to_string());
/// assert_eq!(error.exit_code(), ExitCode::DuplicateTypeName);
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type or table layout is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// An input resource could not be read.
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        /// The offending path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The target could not be written.
    #[error("Failed to write '{}': {source}", path.display())]
    TargetAccess {
        /// The offending path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// File I/O error without path context.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// PE parsing error from the goblin crate.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Other errors that don't fit a specific category.
    #[error("{0}")]
    Error(String),

    /// A table index was encoded into a coded index that does not permit its table.
    #[error("Table {table} is not a valid target of coded index {coded:?}")]
    InvalidCodedIndex {
        /// The coded index kind
        coded: CodedIndexType,
        /// The rejected table
        table: TableId,
    },

    /// A schema registry was built with two descriptors for the same table kind.
    #[error("Table {0} has more than one descriptor")]
    DuplicateTable(TableId),

    /// A table is present in the bitmask but no descriptor was registered for it.
    #[error("Table 0x{0:02x} is present but has no registered schema")]
    MissingSchema(u8),

    /// A row was given cells that do not match its table's columns.
    #[error("Invalid row for table {table}: {message}")]
    InvalidRow {
        /// The table of the row
        table: TableId,
        /// What did not match
        message: String,
    },

    /// A row or table index that is not part of the graph was requested.
    #[error("Index {0:?} is out of range")]
    IndexOutOfRange(TableIndex),

    /// Maximum recursion depth exceeded.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to acquire a lock.
    #[error("Failed to lock target")]
    LockError,

    /// No input assembly was supplied.
    #[error("No input assembly was specified")]
    NoInputs,

    /// Two inputs define the same type and no duplicate policy applies.
    #[error("Duplicate type name '{0}' and no resolution policy applies")]
    DuplicateType(String),

    /// Same-named types that are merged into one declare different generic parameter counts.
    #[error("Type '{0}' has a different number of generic parameters across inputs")]
    GenericParameterMismatch(String),

    /// A module is not IL-only while IL-only input is required.
    #[error("Module '{0}' is not IL-only")]
    NotIlOnly(String),

    /// An assembly reference could not be resolved to a resource.
    #[error("Unresolved assembly reference '{0}'")]
    UnresolvedAssemblyReference(String),

    /// A module reference could not be resolved to a resource.
    #[error("Unresolved module reference '{0}'")]
    UnresolvedModuleReference(String),

    /// A line of a rename mapping file is malformed.
    #[error("Invalid rename mapping at line {line}: '{content}'")]
    InvalidRenameMapping {
        /// 1-based line number
        line: usize,
        /// The offending line
        content: String,
    },

    /// A pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// The regex error
        source: regex::Error,
    },

    /// The strong-name key could not be used.
    #[error("Strong-name key error: {0}")]
    KeyError(String),

    /// A named key container was requested; only key files are supported.
    #[error("Key container '{0}' is not supported, use a key file")]
    KeyContainerUnsupported(String),

    /// A collaborator failed while producing debug information.
    #[error("PDB error: {0}")]
    Pdb(String),

    /// A collaborator failed while merging documentation files.
    #[error("XML documentation error: {0}")]
    XmlDoc(String),

    /// An index was used that has no entry in the merge mapping.
    #[error("Index {index:?} of input {input} has no mapping in the target")]
    UnmappedIndex {
        /// The input graph position
        input: usize,
        /// The unmapped source index
        index: TableIndex,
    },

    /// A raw data column of an input still holds an RVA of its own image, so its content
    /// cannot be carried into the merged module.
    #[error("{column} of {index} in input {input} is the unresolved address 0x{address:08x}")]
    UnresolvedRawData {
        /// The input graph position
        input: usize,
        /// The row holding the reference
        index: TableIndex,
        /// The column name
        column: &'static str,
        /// The address as read
        address: u32,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Maps this error onto the exit code category the merge tool terminates with.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Malformed { .. } | Error::OutOfBounds | Error::Empty => ExitCode::MalformedInput,
            Error::NotSupported | Error::UnresolvedRawData { .. } => ExitCode::UnsupportedLayout,
            Error::Io { .. } | Error::FileError(_) => ExitCode::InputFileAccess,
            Error::TargetAccess { .. } => ExitCode::TargetFileAccess,
            Error::GoblinErr(_) => ExitCode::InvalidImage,
            Error::Error(_) => ExitCode::Internal,
            Error::InvalidCodedIndex { .. } => ExitCode::InvalidCodedIndex,
            Error::DuplicateTable(_) => ExitCode::InvalidSchema,
            Error::MissingSchema(_) => ExitCode::MissingTableSchema,
            Error::InvalidRow { .. } | Error::IndexOutOfRange(_) => ExitCode::InvalidRow,
            Error::RecursionLimit(_) => ExitCode::RecursionLimit,
            Error::LockError => ExitCode::LockPoisoned,
            Error::NoInputs => ExitCode::NoInputAssembly,
            Error::DuplicateType(_) => ExitCode::DuplicateTypeName,
            Error::GenericParameterMismatch(_) => ExitCode::VariableGenericParameterCount,
            Error::NotIlOnly(_) => ExitCode::NotIlOnly,
            Error::UnresolvedAssemblyReference(_) => ExitCode::UnresolvedAssemblyReference,
            Error::UnresolvedModuleReference(_) => ExitCode::UnresolvedModuleReference,
            Error::InvalidRenameMapping { .. } => ExitCode::InvalidRenameMapping,
            Error::InvalidPattern { .. } => ExitCode::InvalidPatternFile,
            Error::KeyError(_) => ExitCode::KeyFileError,
            Error::KeyContainerUnsupported(_) => ExitCode::KeyContainerUnsupported,
            Error::Pdb(_) => ExitCode::PdbError,
            Error::XmlDoc(_) => ExitCode::XmlDocError,
            Error::UnmappedIndex { .. } => ExitCode::UnmappedIndex,
            Error::Configuration(_) => ExitCode::InvalidOptions,
        }
    }
}

/// The closed set of exit codes of the merge tool.
///
/// Every failure category has its own value so scripts can branch on the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// The merge completed.
    Success = 0,
    /// No input assembly was given.
    NoInputAssembly = 1,
    /// A type name collided without an applicable policy.
    DuplicateTypeName = 2,
    /// An assembly reference could not be resolved.
    UnresolvedAssemblyReference = 3,
    /// A module reference could not be resolved.
    UnresolvedModuleReference = 4,
    /// An input could not be read.
    InputFileAccess = 5,
    /// An input's metadata is corrupt.
    MalformedInput = 6,
    /// An input is not a valid PE image.
    InvalidImage = 7,
    /// An input module is not IL-only.
    NotIlOnly = 8,
    /// Merged type instances disagree on their generic parameter count.
    VariableGenericParameterCount = 9,
    /// A rename mapping file entry is malformed.
    InvalidRenameMapping = 10,
    /// An include/exclude pattern file could not be compiled.
    InvalidPatternFile = 11,
    /// The strong-name key file is unusable.
    KeyFileError = 12,
    /// Key containers are not available on this platform.
    KeyContainerUnsupported = 13,
    /// Reading or writing debug information failed.
    PdbError = 14,
    /// Merging XML documentation failed.
    XmlDocError = 15,
    /// The output file could not be written.
    TargetFileAccess = 16,
    /// The options are inconsistent.
    InvalidOptions = 17,
    /// A table layout (such as pointer tables) is not supported.
    UnsupportedLayout = 18,
    /// A coded index was given a table it does not permit.
    InvalidCodedIndex = 19,
    /// The supplied schema registry is inconsistent.
    InvalidSchema = 20,
    /// A present table has no schema.
    MissingTableSchema = 21,
    /// A row does not fit its table.
    InvalidRow = 22,
    /// Signature nesting exceeded the recursion limit.
    RecursionLimit = 23,
    /// A lock was poisoned.
    LockPoisoned = 24,
    /// A merge mapping was missing an index.
    UnmappedIndex = 25,
    /// Any other failure.
    Internal = 26,
}

impl ExitCode {
    /// The numeric process exit status.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(error: &Error) -> Self {
        error.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            Error::NoInputs,
            Error::DuplicateType("A".into()),
            Error::UnresolvedAssemblyReference("B".into()),
            Error::NotIlOnly("C".into()),
            Error::GenericParameterMismatch("D".into()),
            Error::InvalidRenameMapping {
                line: 1,
                content: String::new(),
            },
            Error::Configuration("E".into()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code().code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&ExitCode::Success.code()));
    }

    #[test]
    fn malformed_carries_location() {
        let error = malformed_error!("bad table {}", 3);
        match error {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad table 3");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected malformed"),
        }
    }
}
