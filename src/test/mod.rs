//! Shared helpers of the unit tests.

pub mod builders;
