//! Input validation for patient create and update.
//!
//! Every rule is applied and every violation is collected, so a rejected request
//! reports all of its problems at once. Nothing here touches the database; the
//! uniqueness lookups are done by the service beforehand and passed in as
//! [`TakenIdentifiers`].

use crate::constants::{
    CNS_CHARS, CPF_CHARS, CREATE_PHOTO_MAX_KIB, MAX_CNS_CHARS, MAX_CPF_CHARS, MAX_NUMBER_CHARS,
    MAX_POSTAL_CODE_CHARS, MAX_TEXT_CHARS, STATE_CHARS, UPDATE_PHOTO_MAX_KIB,
};
use crate::models::{AddressInput, NewAddress, PatientInput};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use prs_files::PhotoUpload;
use prs_types::NonEmptyText;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Field-level validation messages, in the order the fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(String, Vec<String>)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, messages)) => messages.push(message.into()),
            None => self.fields.push((field, vec![message.into()])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, messages)| messages.len()).sum()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_message(&self) -> Option<&str> {
        self.fields
            .first()
            .and_then(|(_, messages)| messages.first())
            .map(String::as_str)
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(first) = self.first_message() else {
            return f.write_str("the given data was invalid");
        };
        match self.len() - 1 {
            0 => f.write_str(first),
            1 => write!(f, "{first} (and 1 more error)"),
            more => write!(f, "{first} (and {more} more errors)"),
        }
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

/// Which identifiers already belong to another patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TakenIdentifiers {
    pub cpf: bool,
    pub cns: bool,
}

/// Input that passed every rule.
#[derive(Debug, Clone)]
pub(crate) struct ValidPatient {
    pub full_name: NonEmptyText,
    pub mother_name: NonEmptyText,
    pub birth_date: NaiveDate,
    pub national_id_cpf: NonEmptyText,
    pub national_health_card_cns: NonEmptyText,
    pub address: NewAddress,
    pub photo: Option<PhotoUpload>,
}

/// Rules for a new patient. Address fields are reported with an `address_` prefix.
pub(crate) fn validate_create(
    input: PatientInput,
    taken: TakenIdentifiers,
) -> Result<ValidPatient, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let full_name = text(&mut errors, "full_name", &input.full_name)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let mother_name = text(&mut errors, "mother_name", &input.mother_name)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let birth_date = date(&mut errors, "birth_date", &input.birth_date, DateRule::AnyDate);
    let national_id_cpf = text(&mut errors, "national_id_cpf", &input.national_id_cpf)
        .required()
        .max_chars(MAX_CPF_CHARS)
        .unique(taken.cpf)
        .finish();
    let national_health_card_cns = text(
        &mut errors,
        "national_health_card_cns",
        &input.national_health_card_cns,
    )
    .required()
    .max_chars(MAX_CNS_CHARS)
    .unique(taken.cns)
    .finish();
    let address = create_address(&mut errors, &input.address);
    let photo = photo(&mut errors, input.photo, CREATE_PHOTO_MAX_KIB);

    let (
        Some(full_name),
        Some(mother_name),
        Some(birth_date),
        Some(national_id_cpf),
        Some(national_health_card_cns),
        Some(address),
    ) = (
        full_name,
        mother_name,
        birth_date,
        national_id_cpf,
        national_health_card_cns,
        address,
    )
    else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidPatient {
        full_name,
        mother_name,
        birth_date,
        national_id_cpf,
        national_health_card_cns,
        address,
        photo,
    })
}

/// Rules for updating an existing patient. Address fields are flat.
pub(crate) fn validate_update(
    input: PatientInput,
    taken: TakenIdentifiers,
) -> Result<ValidPatient, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let full_name = text(&mut errors, "full_name", &input.full_name)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let mother_name = text(&mut errors, "mother_name", &input.mother_name)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let birth_date = date(
        &mut errors,
        "birth_date",
        &input.birth_date,
        DateRule::ExactIsoDate,
    );
    let national_id_cpf = text(&mut errors, "national_id_cpf", &input.national_id_cpf)
        .required()
        .exact_chars(CPF_CHARS)
        .unique(taken.cpf)
        .finish();
    let national_health_card_cns = text(
        &mut errors,
        "national_health_card_cns",
        &input.national_health_card_cns,
    )
    .required()
    .exact_chars(CNS_CHARS)
    .unique(taken.cns)
    .finish();
    let photo = photo(&mut errors, input.photo, UPDATE_PHOTO_MAX_KIB);
    let address = update_address(&mut errors, &input.address);

    let (
        Some(full_name),
        Some(mother_name),
        Some(birth_date),
        Some(national_id_cpf),
        Some(national_health_card_cns),
        Some(address),
    ) = (
        full_name,
        mother_name,
        birth_date,
        national_id_cpf,
        national_health_card_cns,
        address,
    )
    else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidPatient {
        full_name,
        mother_name,
        birth_date,
        national_id_cpf,
        national_health_card_cns,
        address,
        photo,
    })
}

fn create_address(errors: &mut ValidationErrors, input: &AddressInput) -> Option<NewAddress> {
    let postal_code = text(errors, "address_postal_code", &input.postal_code)
        .required()
        .max_chars(MAX_POSTAL_CODE_CHARS)
        .finish();
    let street = text(errors, "address_street", &input.street)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let number = text(errors, "address_number", &input.number)
        .required()
        .max_chars(MAX_NUMBER_CHARS)
        .finish();
    let complement = text(errors, "address_complement", &input.complement)
        .max_chars(MAX_TEXT_CHARS)
        .finish_optional();
    let neighborhood = text(errors, "address_neighborhood", &input.neighborhood)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let city = text(errors, "address_city", &input.city)
        .required()
        .max_chars(MAX_TEXT_CHARS)
        .finish();
    let state = text(errors, "address_state", &input.state)
        .required()
        .exact_chars(STATE_CHARS)
        .finish();

    Some(NewAddress {
        postal_code: postal_code?,
        street: street?,
        number: number?,
        complement: complement?,
        neighborhood: neighborhood?,
        city: city?,
        state: state?,
    })
}

fn update_address(errors: &mut ValidationErrors, input: &AddressInput) -> Option<NewAddress> {
    let postal_code = text(errors, "postal_code", &input.postal_code)
        .required()
        .finish();
    let street = text(errors, "street", &input.street).required().finish();
    let number = text(errors, "number", &input.number).required().finish();
    let complement = NonEmptyText::from_optional(input.complement.as_deref());
    let neighborhood = text(errors, "neighborhood", &input.neighborhood)
        .required()
        .finish();
    let city = text(errors, "city", &input.city).required().finish();
    let state = text(errors, "state", &input.state).required().finish();

    Some(NewAddress {
        postal_code: postal_code?,
        street: street?,
        number: number?,
        complement,
        neighborhood: neighborhood?,
        city: city?,
        state: state?,
    })
}

/// Rule chain for one text field. The first failing rule records its message and
/// the remaining rules for that field are skipped.
struct TextField<'e> {
    errors: &'e mut ValidationErrors,
    name: &'static str,
    value: Option<NonEmptyText>,
    failed: bool,
}

fn text<'e>(
    errors: &'e mut ValidationErrors,
    name: &'static str,
    raw: &Option<String>,
) -> TextField<'e> {
    TextField {
        errors,
        name,
        value: NonEmptyText::from_optional(raw.as_deref()),
        failed: false,
    }
}

impl TextField<'_> {
    fn fail(&mut self, message: String) {
        self.errors.add(self.name, message);
        self.failed = true;
    }

    fn check(mut self, violated: impl FnOnce(&NonEmptyText) -> bool, message: String) -> Self {
        if !self.failed && self.value.as_ref().is_some_and(violated) {
            self.fail(message);
        }
        self
    }

    fn required(mut self) -> Self {
        if self.value.is_none() {
            let message = format!("The {} field is required.", attribute(self.name));
            self.fail(message);
        }
        self
    }

    fn max_chars(self, max: usize) -> Self {
        let message = format!(
            "The {} must not be greater than {max} characters.",
            attribute(self.name)
        );
        self.check(|v| v.char_count() > max, message)
    }

    fn exact_chars(self, size: usize) -> Self {
        let message = format!("The {} must be {size} characters.", attribute(self.name));
        self.check(|v| v.char_count() != size, message)
    }

    fn unique(self, taken: bool) -> Self {
        let message = format!("The {} has already been taken.", attribute(self.name));
        self.check(|_| taken, message)
    }

    fn finish(self) -> Option<NonEmptyText> {
        if self.failed {
            None
        } else {
            self.value
        }
    }

    /// For fields that may be absent: `None` on failure, `Some(None)` when blank.
    fn finish_optional(self) -> Option<Option<NonEmptyText>> {
        (!self.failed).then_some(self.value)
    }
}

#[derive(Debug, Clone, Copy)]
enum DateRule {
    /// `YYYY-MM-DD`, or an ISO-8601 date-time whose date part is used.
    AnyDate,
    /// Exactly `YYYY-MM-DD`.
    ExactIsoDate,
}

fn date(
    errors: &mut ValidationErrors,
    name: &'static str,
    raw: &Option<String>,
    rule: DateRule,
) -> Option<NaiveDate> {
    let value = text(errors, name, raw).required().finish()?;
    let value = value.as_str();

    let parsed = match rule {
        DateRule::AnyDate => parse_any_date(value),
        DateRule::ExactIsoDate => parse_exact_iso_date(value),
    };

    if parsed.is_none() {
        let message = match rule {
            DateRule::AnyDate => format!("The {} is not a valid date.", attribute(name)),
            DateRule::ExactIsoDate => format!(
                "The {} does not match the format YYYY-MM-DD.",
                attribute(name)
            ),
        };
        errors.add(name, message);
    }
    parsed
}

fn parse_exact_iso_date(value: &str) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    (parsed.format("%Y-%m-%d").to_string() == value).then_some(parsed)
}

fn parse_any_date(value: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|dt| dt.date())
}

fn photo(
    errors: &mut ValidationErrors,
    upload: Option<PhotoUpload>,
    max_kib: u64,
) -> Option<PhotoUpload> {
    // An empty file part is what browsers send when no file was chosen.
    let upload = upload.filter(|u| !u.bytes.is_empty())?;

    if !upload.is_image() {
        errors.add("photo", "The photo must be an image.");
        return None;
    }
    if upload.size_bytes() > max_kib * 1024 {
        errors.add(
            "photo",
            format!("The photo must not be greater than {max_kib} kilobytes."),
        );
        return None;
    }
    Some(upload)
}

fn attribute(name: &str) -> String {
    name.replace('_', " ")
}
