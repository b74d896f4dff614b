//! SQLite-backed destination store for the backend-less variant.
//!
//! # Responsibility
//! - Persist destinations in the local `destinations` table.
//! - Apply the same owner-scoped verbs as the hosted backend.
//!
//! # Invariants
//! - The connection must be migrated before construction (`try_new` checks).
//! - `updated_at` strictly increases on every matched update.
//! - List order is `created_at DESC`, ties broken by newest insertion.
//! - Statements are blocking and run on the caller's executor thread while
//!   holding the connection mutex; calls from one store are serialized.

use crate::db::migrations::ensure_latest;
use crate::db::{open_db, open_db_in_memory};
use crate::identity::Identity;
use crate::model::destination::{
    Category, Destination, DestinationChanges, DestinationId, NewDestination, OwnerId,
    VISIT_DATE_FORMAT,
};
use crate::repo::destination_repo::{check_owned_row, DestinationRepository, RepoError, RepoResult};
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

const DESTINATION_COLUMNS: &str = "id,
    owner_id,
    name,
    latitude,
    longitude,
    category,
    visited,
    visit_date,
    notes,
    rating,
    photos,
    tags,
    created_at,
    updated_at";

/// Local destination repository over one SQLite connection.
pub struct SqliteDestinationRepository {
    conn: Mutex<Connection>,
}

impl SqliteDestinationRepository {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `RepoError::Db` when the schema version is not the latest known one.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_latest(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}

impl DestinationRepository for SqliteDestinationRepository {
    async fn select_where(&self, identity: &Identity) -> RepoResult<Vec<Destination>> {
        self.with_conn(|conn| select_owned(conn, identity))
    }

    async fn insert(&self, identity: &Identity, input: &NewDestination) -> RepoResult<Destination> {
        self.with_conn(|conn| insert_owned(conn, identity, input))
    }

    async fn update_where(
        &self,
        identity: &Identity,
        id: DestinationId,
        changes: &DestinationChanges,
    ) -> RepoResult<Option<Destination>> {
        self.with_conn(|conn| update_owned(conn, identity, id, changes))
    }

    async fn delete_where(&self, identity: &Identity, id: DestinationId) -> RepoResult<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM destinations WHERE id = ?1 AND owner_id = ?2;",
                params![id.to_string(), identity.user_id.to_string()],
            )?;
            debug!(
                "event=destination_delete module=repo backend=sqlite rows={}",
                changed
            );
            Ok(changed as u64)
        })
    }
}

fn select_owned(conn: &Connection, identity: &Identity) -> RepoResult<Vec<Destination>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DESTINATION_COLUMNS}
         FROM destinations
         WHERE owner_id = ?1
         ORDER BY created_at DESC, rowid DESC;"
    ))?;

    let mut rows = stmt.query([identity.user_id.to_string()])?;
    let mut destinations = Vec::new();
    while let Some(row) = rows.next()? {
        destinations.push(check_owned_row(identity, parse_destination_row(row)?)?);
    }

    Ok(destinations)
}

fn insert_owned(
    conn: &Connection,
    identity: &Identity,
    input: &NewDestination,
) -> RepoResult<Destination> {
    let now = now_millis();
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO destinations ({DESTINATION_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
         RETURNING {DESTINATION_COLUMNS};"
    ))?;

    let mut rows = stmt.query(params![
        Uuid::new_v4().to_string(),
        identity.user_id.to_string(),
        input.name.as_str(),
        input.latitude,
        input.longitude,
        input.category.as_str(),
        input.visited,
        input.visit_date.map(format_visit_date),
        input.notes.as_deref(),
        input.rating.map(i64::from),
        encode_list(&input.photos)?,
        encode_list(&input.tags)?,
        now,
    ])?;

    match rows.next()? {
        Some(row) => check_owned_row(identity, parse_destination_row(row)?),
        None => Err(RepoError::InvalidData(
            "insert returned no row".to_string(),
        )),
    }
}

fn update_owned(
    conn: &Connection,
    identity: &Identity,
    id: DestinationId,
    changes: &DestinationChanges,
) -> RepoResult<Option<Destination>> {
    let mut assignments: Vec<&'static str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = changes.name.as_ref() {
        assignments.push("name = ?");
        bind_values.push(Value::Text(name.clone()));
    }
    if let Some(latitude) = changes.latitude {
        assignments.push("latitude = ?");
        bind_values.push(Value::Real(latitude));
    }
    if let Some(longitude) = changes.longitude {
        assignments.push("longitude = ?");
        bind_values.push(Value::Real(longitude));
    }
    if let Some(category) = changes.category {
        assignments.push("category = ?");
        bind_values.push(Value::Text(category.as_str().to_string()));
    }
    if let Some(visited) = changes.visited {
        assignments.push("visited = ?");
        bind_values.push(Value::Integer(i64::from(visited)));
    }
    if let Some(visit_date) = changes.visit_date {
        assignments.push("visit_date = ?");
        bind_values.push(optional_text(visit_date.map(format_visit_date)));
    }
    if let Some(notes) = changes.notes.as_ref() {
        assignments.push("notes = ?");
        bind_values.push(optional_text(notes.clone()));
    }
    if let Some(rating) = changes.rating {
        assignments.push("rating = ?");
        bind_values.push(rating.map_or(Value::Null, |value| Value::Integer(i64::from(value))));
    }
    if let Some(photos) = changes.photos.as_ref() {
        assignments.push("photos = ?");
        bind_values.push(Value::Text(encode_list(photos)?));
    }
    if let Some(tags) = changes.tags.as_ref() {
        assignments.push("tags = ?");
        bind_values.push(Value::Text(encode_list(tags)?));
    }

    // Millisecond clock ties still move the timestamp forward.
    assignments.push("updated_at = MAX(?, updated_at + 1)");
    bind_values.push(Value::Integer(now_millis()));

    bind_values.push(Value::Text(id.to_string()));
    bind_values.push(Value::Text(identity.user_id.to_string()));

    let sql = format!(
        "UPDATE destinations
         SET {}
         WHERE id = ? AND owner_id = ?
         RETURNING {DESTINATION_COLUMNS};",
        assignments.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    match rows.next()? {
        Some(row) => Ok(Some(check_owned_row(identity, parse_destination_row(row)?)?)),
        None => Ok(None),
    }
}

fn parse_destination_row(row: &Row<'_>) -> RepoResult<Destination> {
    let id = parse_uuid(row.get::<_, String>("id")?, "id")?;
    let owner_id: OwnerId = parse_uuid(row.get::<_, String>("owner_id")?, "owner_id")?;

    let category_text: String = row.get("category")?;
    let category = Category::parse(&category_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid category `{category_text}` in destinations.category"
        ))
    })?;

    let visit_date = match row.get::<_, Option<String>>("visit_date")? {
        Some(value) => Some(
            NaiveDate::parse_from_str(&value, VISIT_DATE_FORMAT).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid visit date `{value}` in destinations.visit_date"
                ))
            })?,
        ),
        None => None,
    };

    let rating = match row.get::<_, Option<i64>>("rating")? {
        Some(value) => Some(u8::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("invalid rating `{value}` in destinations.rating"))
        })?),
        None => None,
    };

    Ok(Destination {
        id,
        owner_id,
        name: row.get("name")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        category,
        visited: row.get("visited")?,
        visit_date,
        notes: row.get("notes")?,
        rating,
        photos: decode_list(row.get("photos")?, "photos")?,
        tags: decode_list(row.get("tags")?, "tags")?,
        created_at: parse_millis(row.get("created_at")?, "created_at")?,
        updated_at: parse_millis(row.get("updated_at")?, "updated_at")?,
    })
}

fn parse_uuid(value: String, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(&value).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{value}` in destinations.{column}"))
    })
}

fn parse_millis(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{value}` in destinations.{column}"))
    })
}

fn encode_list(values: &[String]) -> RepoResult<String> {
    serde_json::to_string(values)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode list: {err}")))
}

fn decode_list(text: String, column: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(&text).map_err(|err| {
        RepoError::InvalidData(format!("invalid JSON list in destinations.{column}: {err}"))
    })
}

fn format_visit_date(date: NaiveDate) -> String {
    date.format(VISIT_DATE_FORMAT).to_string()
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::SqliteDestinationRepository;
    use crate::db::DbError;
    use crate::repo::destination_repo::RepoError;
    use rusqlite::Connection;

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteDestinationRepository::try_new(conn)
            .err()
            .expect("unmigrated connection must be rejected");
        assert!(matches!(
            err,
            RepoError::Db(DbError::SchemaNotReady { db_version: 0, .. })
        ));
    }
}
