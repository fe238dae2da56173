//! Request body extraction for create and update.
//!
//! Patient forms arrive as `multipart/form-data` (the only way to send a photo),
//! `application/x-www-form-urlencoded` or JSON. All three are flattened into the
//! same [`PatientForm`], which keeps prefixed (`address_*`) and flat address fields
//! apart so create and update can each read the names they expect.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use prs_core::{AddressInput, PatientInput};
use prs_files::PhotoUpload;
use serde_json::Value;
use std::collections::HashMap;

const ADDRESS_PREFIXES: [&str; 2] = ["address_", "endereco_"];

/// Patient fields decoded from any supported body type.
#[derive(Debug, Default)]
pub struct PatientForm {
    full_name: Option<String>,
    mother_name: Option<String>,
    birth_date: Option<String>,
    national_id_cpf: Option<String>,
    national_health_card_cns: Option<String>,
    prefixed_address: AddressInput,
    flat_address: AddressInput,
    photo: Option<PhotoUpload>,
}

impl PatientForm {
    /// Input for create, which reads `address_*` fields.
    pub fn into_create_input(self) -> PatientInput {
        self.into_input(true)
    }

    /// Input for update, which reads flat address fields.
    pub fn into_update_input(self) -> PatientInput {
        self.into_input(false)
    }

    fn into_input(self, prefixed: bool) -> PatientInput {
        PatientInput {
            full_name: self.full_name,
            mother_name: self.mother_name,
            birth_date: self.birth_date,
            national_id_cpf: self.national_id_cpf,
            national_health_card_cns: self.national_health_card_cns,
            address: if prefixed {
                self.prefixed_address
            } else {
                self.flat_address
            },
            photo: self.photo,
        }
    }

    /// Record one text field. Unknown names are ignored.
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "full_name" => &mut self.full_name,
            "mother_name" => &mut self.mother_name,
            "birth_date" | "data_nascimento" => &mut self.birth_date,
            "national_id_cpf" => &mut self.national_id_cpf,
            "national_health_card_cns" => &mut self.national_health_card_cns,
            // A photo sent as plain text is kept so validation can reject it.
            "photo" => {
                self.photo = Some(PhotoUpload::new(None, value.into_bytes()));
                return;
            }
            _ => {
                let prefixed = ADDRESS_PREFIXES
                    .iter()
                    .find_map(|prefix| name.strip_prefix(prefix));
                let (address, field) = match prefixed {
                    Some(field) => (&mut self.prefixed_address, field),
                    None => (&mut self.flat_address, name),
                };
                match address_slot(address, field) {
                    Some(slot) => slot,
                    None => return,
                }
            }
        };
        *slot = Some(value);
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = PatientForm::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "photo" {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                form.photo = Some(PhotoUpload::new(filename, bytes.to_vec()));
            } else {
                let text = field.text().await.map_err(bad_multipart)?;
                form.set(&name, text);
            }
        }
        Ok(form)
    }

    fn from_json(body: HashMap<String, Value>) -> Self {
        let mut form = PatientForm::default();
        for (name, value) in body {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            form.set(&name, text);
        }
        form
    }

    fn from_pairs(body: HashMap<String, String>) -> Self {
        let mut form = PatientForm::default();
        for (name, value) in body {
            form.set(&name, value);
        }
        form
    }
}

fn address_slot<'a>(address: &'a mut AddressInput, field: &str) -> Option<&'a mut Option<String>> {
    Some(match field {
        "postal_code" => &mut address.postal_code,
        "street" => &mut address.street,
        "number" => &mut address.number,
        "complement" => &mut address.complement,
        "neighborhood" => &mut address.neighborhood,
        "city" => &mut address.city,
        "state" => &mut address.state,
        _ => return None,
    })
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(err.body_text())
}

#[async_trait]
impl<S> FromRequest<S> for PatientForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            PatientForm::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<HashMap<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(PatientForm::from_json(body))
        } else {
            let Form(body) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(PatientForm::from_pairs(body))
        }
    }
}
