// Copyright 2025 Johann Kempter
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
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilmerge
//!
//! An ECMA-335 metadata engine: a physical table/row model with a lossless binary codec,
//! an IL instruction codec, a cached metadata loader and an N-way assembly merge engine.
//!
//! ## Layers
//!
//! - [`metadata::tables`] - table schema registry, column codecs, the table serialization
//!   engine and the row-permutation machinery shared by sorting and merging
//! - [`metadata::streams`] - #Strings, #Blob, #GUID and #US heap readers and builders
//! - [`metadata::signatures`] - signature grammar (methods, fields, properties, locals,
//!   type specs, method specs)
//! - [`assembly`] - the opcode catalog and IL stream codec
//! - [`metadata::method`] - method bodies (tiny/fat headers, exception clauses)
//! - [`loader`] - resolves resources to parsed metadata graphs with at-most-once caching
//! - [`merge`] - combines several metadata graphs into one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilmerge::prelude::*;
//!
//! let loader = ConcurrentLoader::new(FileSystemResolver::default(), LoaderOptions::default());
//! let first = loader.load_and_resolve("First.dll")?;
//! let second = loader.load_and_resolve("Second.dll")?;
//!
//! let guards = [first.read()?, second.read()?];
//! let inputs: Vec<&CilMetadata> = guards.iter().map(|g| &**g).collect();
//!
//! let mut result = merge(&inputs, &MergeOptions::default(), &Collaborators::default())?;
//! let module = result.target.serialize(&WriteOptions::default())?;
//! println!("metadata root is {} bytes", module.metadata.len());
//! # Ok::<(), cilmerge::Error>(())
//! ```
//!
//! ## Building a graph in memory
//!
//! ```rust
//! use cilmerge::prelude::*;
//! use cilmerge::metadata::tables::columns::typedef;
//!
//! let mut graph = CilMetadata::new();
//! graph.tables_mut().push(
//!     TableId::MODULE,
//!     vec![Cell::Int(0), Cell::str("Demo.dll"), Cell::Guid(None), Cell::Guid(None), Cell::Guid(None)],
//! )?;
//! let row = graph.tables_mut().push(
//!     TableId::TYPE_DEF,
//!     vec![
//!         Cell::Int(0),
//!         Cell::str("<Module>"),
//!         Cell::str(""),
//!         Cell::Index(None),
//!         Cell::list(TableId::FIELD, 0),
//!         Cell::list(TableId::METHOD_DEF, 0),
//!     ],
//! )?;
//! assert_eq!(graph.tables().row(row)?.string(typedef::TYPE_NAME)?, "<Module>");
//! # Ok::<(), cilmerge::Error>(())
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub(crate) mod file;

#[cfg(test)]
pub(crate) mod test;

/// Commonly used types, re-exported for convenience.
pub mod prelude;

/// The opcode catalog and the IL instruction stream codec.
pub mod assembly;

/// Interfaces of the external collaborators (crypto, PDB, XML documentation) and their
/// default implementations.
pub mod collaborators;

/// Resolution of resources to parsed metadata graphs.
pub mod loader;

/// The assembly merge engine.
pub mod merge;

/// The metadata model: tables, heaps, signatures, method bodies and the metadata graph.
pub mod metadata;

pub use error::{Error, ExitCode};

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

pub use file::{io::CilIO, parser::Parser};
pub use metadata::graph::CilMetadata;
