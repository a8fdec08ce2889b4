//! # cilmerge Prelude
//!
//! The types most programs need to load, merge and write metadata. Import this module to
//! get them all at once.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilmerge operations
pub use crate::Error;

/// Process exit codes, one per error category
pub use crate::ExitCode;

/// The result type used throughout cilmerge
pub use crate::Result;

// ================================================================================================
// Metadata Graphs
// ================================================================================================

/// One module's metadata, its serialization options and output
pub use crate::metadata::graph::{CilMetadata, SerializedModule, WriteOptions};

/// The physical table model
pub use crate::metadata::tables::{Blob, Cell, RawData, Row, TableId, TableIndex, Tables};

/// Method bodies and IL instructions
pub use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::method::MethodBody,
};

// ================================================================================================
// Loading
// ================================================================================================

/// Loaders and resource resolution
pub use crate::loader::{
    ConcurrentLoader, FileSystemResolver, LoadedGraph, LoaderOptions, LocalLoader,
    MetadataLoader, ResourceResolver,
};

// ================================================================================================
// Merging
// ================================================================================================

/// The merge engine and its configuration
pub use crate::merge::{
    merge, DuplicatePolicy, MergeOptions, MergeResult, MergeWarning, TokenRemapper, Version,
};

/// External services of a merge
pub use crate::collaborators::{Collaborators, HashAlgorithm, SigningKey};
