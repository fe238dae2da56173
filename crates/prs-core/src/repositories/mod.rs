//! Row-level access to the `addresses` and `patients` tables.
//!
//! Functions take a bare connection so the same code runs against a pooled
//! connection or inside a transaction opened by the service.

pub(crate) mod addresses;
pub(crate) mod patients;
