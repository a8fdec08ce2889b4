//! The metadata model of a CLI module.
//!
//! # Key Components
//!
//! - [`tables`] - table schema registry, typed rows and the `#~` stream codec
//! - [`streams`] - `#Strings`, `#Blob`, `#GUID` and `#US` heap readers and builders
//! - [`signatures`] - method, field, property, local and type signatures
//! - [`method`] - method bodies and exception handlers
//! - [`graph`] - [`CilMetadata`](graph::CilMetadata), the resolved tables of one module
//!
//! # Examples
//!
//! ```rust
//! use cilmerge::metadata::{graph::{CilMetadata, WriteOptions}, tables::{Cell, TableId}};
//!
//! let mut graph = CilMetadata::new();
//! graph.tables_mut().push(
//!     TableId::MODULE,
//!     vec![Cell::Int(0), Cell::str("App.dll"), Cell::Guid(None), Cell::Guid(None), Cell::Guid(None)],
//! )?;
//! let module = graph.serialize(&WriteOptions::default())?;
//! let read = CilMetadata::read(&module.metadata, graph.schema().clone(), None)?;
//! assert_eq!(read.module_name()?, "App.dll");
//! # Ok::<(), cilmerge::Error>(())
//! ```

/// Values of the `Constant` table
pub mod constant;
/// Custom attribute value blobs
pub mod customattributes;
/// Attribute flags of the table columns
pub mod flags;
/// The metadata graph of one module
pub mod graph;
/// Native marshalling descriptors
pub mod marshalling;
/// Method bodies
pub mod method;
/// The metadata root and its stream directory
pub mod root;
/// Section content referenced by method bodies, field data and resources
pub mod sections;
/// Declarative security permission sets
pub mod security;
/// Signature blobs
pub mod signatures;
/// Metadata heaps
pub mod streams;
/// Metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
/// Reflection-style type names
pub mod typename;
