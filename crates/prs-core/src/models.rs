//! Patient and address records as returned to callers, and the raw inputs
//! accepted by the create and update operations.

use chrono::{DateTime, NaiveDate, Utc};
use prs_files::PhotoUpload;
use prs_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Address {
    pub id: i64,
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    /// Two-letter state (UF) code
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A patient with its address embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: i64,
    pub full_name: String,
    pub mother_name: String,
    #[schema(value_type = String, format = Date, example = "1990-01-01")]
    pub birth_date: NaiveDate,
    pub national_id_cpf: String,
    pub national_health_card_cns: String,
    /// Set only when a photo was stored
    pub photo_url: Option<String>,
    pub address_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Address,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatientPage {
    pub items: Vec<Patient>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
}

impl PatientPage {
    pub(crate) fn new(items: Vec<Patient>, page: u32, per_page: u32, total: u64) -> Self {
        let last_page = total.div_ceil(u64::from(per_page)).max(1);
        Self {
            items,
            page,
            per_page,
            total,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
        }
    }
}

/// Address fields as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressInput {
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Patient fields as received, before validation. Shared by create and update,
/// which apply different rules to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientInput {
    pub full_name: Option<String>,
    pub mother_name: Option<String>,
    pub birth_date: Option<String>,
    pub national_id_cpf: Option<String>,
    pub national_health_card_cns: Option<String>,
    pub address: AddressInput,
    pub photo: Option<PhotoUpload>,
}

/// A validated address ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub postal_code: NonEmptyText,
    pub street: NonEmptyText,
    pub number: NonEmptyText,
    pub complement: Option<NonEmptyText>,
    pub neighborhood: NonEmptyText,
    pub city: NonEmptyText,
    pub state: NonEmptyText,
}
