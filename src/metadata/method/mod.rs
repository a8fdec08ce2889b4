//! Method bodies: tiny and fat headers, decoded code and exception handling clauses.
//!
//! Bodies live at the RVA held by `MethodDef.RVA`. They are decoded when a graph is fully
//! resolved and re-materialized through the section part builder when it is written.

mod body;
mod exceptions;
mod types;

pub use body::{MethodBody, TINY_MAX_STACK};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;
