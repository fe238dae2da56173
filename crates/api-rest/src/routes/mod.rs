//! HTTP handlers.

pub(crate) mod health;
pub(crate) mod patients;
