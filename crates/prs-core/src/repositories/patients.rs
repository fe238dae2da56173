//! Patient rows, always read together with their address.

use crate::models::{Address, Patient};
use crate::validation::ValidPatient;
use crate::PatientResult;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;

const SELECT_PATIENT: &str = "SELECT \
     p.id, p.full_name, p.mother_name, p.birth_date, p.national_id_cpf, \
     p.national_health_card_cns, p.photo_url, p.address_id, p.created_at, p.updated_at, \
     a.postal_code AS address_postal_code, a.street AS address_street, \
     a.number AS address_number, a.complement AS address_complement, \
     a.neighborhood AS address_neighborhood, a.city AS address_city, \
     a.state AS address_state, a.created_at AS address_created_at, \
     a.updated_at AS address_updated_at \
     FROM patients p JOIN addresses a ON a.id = p.address_id";

const SEARCH_FILTER: &str = "p.full_name_folded LIKE ?1 ESCAPE '\\' \
     OR p.national_id_cpf LIKE ?1 ESCAPE '\\' \
     OR p.national_health_card_cns LIKE ?1 ESCAPE '\\'";

#[derive(sqlx::FromRow)]
struct PatientRow {
    id: i64,
    full_name: String,
    mother_name: String,
    birth_date: NaiveDate,
    national_id_cpf: String,
    national_health_card_cns: String,
    photo_url: Option<String>,
    address_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    address_postal_code: String,
    address_street: String,
    address_number: String,
    address_complement: Option<String>,
    address_neighborhood: String,
    address_city: String,
    address_state: String,
    address_created_at: DateTime<Utc>,
    address_updated_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: row.id,
            full_name: row.full_name,
            mother_name: row.mother_name,
            birth_date: row.birth_date,
            national_id_cpf: row.national_id_cpf,
            national_health_card_cns: row.national_health_card_cns,
            photo_url: row.photo_url,
            address_id: row.address_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            address: Address {
                id: row.address_id,
                postal_code: row.address_postal_code,
                street: row.address_street,
                number: row.address_number,
                complement: row.address_complement,
                neighborhood: row.address_neighborhood,
                city: row.address_city,
                state: row.address_state,
                created_at: row.address_created_at,
                updated_at: row.address_updated_at,
            },
        }
    }
}

/// Lowercase a name the way `full_name_folded` is stored.
fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Turn a search term into a lowercased `LIKE` pattern matching it anywhere,
/// with `%`, `_` and `\` in the term taken literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in fold(term).chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// One page of patients ordered by name, optionally filtered by `term`.
pub(crate) async fn search(
    conn: &mut SqliteConnection,
    term: Option<&str>,
    limit: u32,
    offset: u64,
) -> PatientResult<Vec<Patient>> {
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let rows = match term {
        Some(term) => {
            let sql = format!(
                "{SELECT_PATIENT} WHERE {SEARCH_FILTER} ORDER BY p.full_name, p.id LIMIT ?2 OFFSET ?3"
            );
            sqlx::query_as::<_, PatientRow>(&sql)
                .bind(like_pattern(term))
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&mut *conn)
                .await?
        }
        None => {
            let sql = format!("{SELECT_PATIENT} ORDER BY p.full_name, p.id LIMIT ?1 OFFSET ?2");
            sqlx::query_as::<_, PatientRow>(&sql)
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&mut *conn)
                .await?
        }
    };
    Ok(rows.into_iter().map(Patient::from).collect())
}

/// Number of patients matching `term` (all patients when `None`).
pub(crate) async fn count(conn: &mut SqliteConnection, term: Option<&str>) -> PatientResult<u64> {
    let total: i64 = match term {
        Some(term) => {
            let sql = format!("SELECT COUNT(*) FROM patients p WHERE {SEARCH_FILTER}");
            sqlx::query_scalar(&sql)
                .bind(like_pattern(term))
                .fetch_one(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM patients")
                .fetch_one(&mut *conn)
                .await?
        }
    };
    Ok(u64::try_from(total).unwrap_or(0))
}

pub(crate) async fn find(conn: &mut SqliteConnection, id: i64) -> PatientResult<Option<Patient>> {
    let sql = format!("{SELECT_PATIENT} WHERE p.id = ?");
    let row = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Patient::from))
}

pub(crate) async fn exists(conn: &mut SqliteConnection, id: i64) -> PatientResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM patients WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Whether another patient (not `except_id`) already has this CPF.
pub(crate) async fn is_cpf_taken(
    conn: &mut SqliteConnection,
    cpf: &str,
    except_id: Option<i64>,
) -> PatientResult<bool> {
    is_taken(conn, "national_id_cpf", cpf, except_id).await
}

/// Whether another patient (not `except_id`) already has this CNS.
pub(crate) async fn is_cns_taken(
    conn: &mut SqliteConnection,
    cns: &str,
    except_id: Option<i64>,
) -> PatientResult<bool> {
    is_taken(conn, "national_health_card_cns", cns, except_id).await
}

async fn is_taken(
    conn: &mut SqliteConnection,
    column: &'static str,
    value: &str,
    except_id: Option<i64>,
) -> PatientResult<bool> {
    let sql = format!("SELECT COUNT(*) FROM patients WHERE {column} = ? AND (? IS NULL OR id <> ?)");
    let total: i64 = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(except_id)
        .bind(except_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(total > 0)
}

/// Insert a patient pointing at `address_id` and return its new id.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    patient: &ValidPatient,
    address_id: i64,
    photo_url: Option<&str>,
) -> PatientResult<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO patients \
         (full_name, full_name_folded, mother_name, birth_date, national_id_cpf, \
          national_health_card_cns, photo_url, address_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(patient.full_name.as_str())
    .bind(fold(patient.full_name.as_str()))
    .bind(patient.mother_name.as_str())
    .bind(patient.birth_date)
    .bind(patient.national_id_cpf.as_str())
    .bind(patient.national_health_card_cns.as_str())
    .bind(photo_url)
    .bind(address_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Overwrite the patient's scalar fields and address link. `photo_url` replaces
/// the stored value only when `Some`. Returns the number of rows changed.
pub(crate) async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    patient: &ValidPatient,
    address_id: i64,
    photo_url: Option<&str>,
) -> PatientResult<u64> {
    let result = sqlx::query(
        "UPDATE patients SET \
         full_name = ?, full_name_folded = ?, mother_name = ?, birth_date = ?, \
         national_id_cpf = ?, national_health_card_cns = ?, photo_url = COALESCE(?, photo_url), \
         address_id = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(patient.full_name.as_str())
    .bind(fold(patient.full_name.as_str()))
    .bind(patient.mother_name.as_str())
    .bind(patient.birth_date)
    .bind(patient.national_id_cpf.as_str())
    .bind(patient.national_health_card_cns.as_str())
    .bind(photo_url)
    .bind(address_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Delete the patient row only; its address is left in place.
pub(crate) async fn delete(conn: &mut SqliteConnection, id: i64) -> PatientResult<u64> {
    let result = sqlx::query("DELETE FROM patients WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
