//! Building blocks which are not tied to a specific resource
//!
//! Type-safe wrappers move the validation "upwards", so that illegal values are rejected before
//! any request is sent to the cluster.

pub mod macros;
pub mod types;
