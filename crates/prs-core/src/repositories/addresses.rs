//! Address rows.

use crate::models::{Address, NewAddress};
use crate::PatientResult;
use chrono::Utc;
use sqlx::SqliteConnection;

const SELECT_ADDRESS: &str = "SELECT id, postal_code, street, number, complement, neighborhood, \
     city, state, created_at, updated_at FROM addresses";

/// Insert a new address row and return it.
pub(crate) async fn insert(conn: &mut SqliteConnection, new: &NewAddress) -> PatientResult<Address> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO addresses \
         (postal_code, street, number, complement, neighborhood, city, state, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.postal_code.as_str())
    .bind(new.street.as_str())
    .bind(new.number.as_str())
    .bind(new.complement.as_ref().map(|c| c.as_str()))
    .bind(new.neighborhood.as_str())
    .bind(new.city.as_str())
    .bind(new.state.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Address {
        id,
        postal_code: new.postal_code.to_string(),
        street: new.street.to_string(),
        number: new.number.to_string(),
        complement: new.complement.as_ref().map(ToString::to_string),
        neighborhood: new.neighborhood.to_string(),
        city: new.city.to_string(),
        state: new.state.to_string(),
        created_at: now,
        updated_at: now,
    })
}

/// Oldest address with this postal code, if any.
pub(crate) async fn find_first_by_postal_code(
    conn: &mut SqliteConnection,
    postal_code: &str,
) -> PatientResult<Option<Address>> {
    let sql = format!("{SELECT_ADDRESS} WHERE postal_code = ? ORDER BY id LIMIT 1");
    Ok(sqlx::query_as::<_, Address>(&sql)
        .bind(postal_code)
        .fetch_optional(&mut *conn)
        .await?)
}

/// Reuse the first address with the same postal code, or insert `new`.
///
/// An existing row is returned untouched even if the other fields differ.
pub(crate) async fn find_or_create_by_postal_code(
    conn: &mut SqliteConnection,
    new: &NewAddress,
) -> PatientResult<Address> {
    if let Some(existing) = find_first_by_postal_code(conn, new.postal_code.as_str()).await? {
        tracing::debug!(
            "reusing address {} for postal code {}",
            existing.id,
            existing.postal_code
        );
        return Ok(existing);
    }
    insert(conn, new).await
}
