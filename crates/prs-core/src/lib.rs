//! # PRS Core
//!
//! Core business logic for the patient registry service.
//!
//! This crate owns the patient and address data model and everything needed to
//! change it safely:
//! - Input validation with per-field messages ([`ValidationErrors`])
//! - SQLite persistence through `sqlx`, with embedded migrations ([`Database`])
//! - The patient operations: search, create, show, update and delete ([`PatientService`])
//!
//! Photo bytes are handled by the `prs_files` crate behind the [`prs_files::PhotoStore`]
//! trait, which is injected into the service.
//!
//! **No API concerns**: HTTP routing, request decoding and status codes belong in `api-rest`.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod patient;
pub(crate) mod repositories;
pub mod validation;

pub use config::CoreConfig;
pub use db::Database;
pub use error::{PatientError, PatientResult};
pub use models::{Address, AddressInput, Patient, PatientInput, PatientPage};
pub use patient::PatientService;
pub use prs_types::NonEmptyText;
pub use validation::ValidationErrors;
