//! Destination repository contract.
//!
//! Four verbs over one table, each implicitly scoped by an owner equality
//! filter derived from the caller identity.

use crate::db::DbError;
use crate::identity::Identity;
use crate::model::destination::{
    Destination, DestinationChanges, DestinationId, NewDestination,
};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Backend failure for destination persistence and query operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid destination data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Owner-scoped filtered-table capability.
pub trait DestinationRepository: Send + Sync {
    /// Returns all rows owned by `identity`, newest `created_at` first.
    fn select_where(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = RepoResult<Vec<Destination>>> + Send;

    /// Inserts one row owned by `identity`; the backend assigns id and timestamps.
    fn insert(
        &self,
        identity: &Identity,
        input: &NewDestination,
    ) -> impl Future<Output = RepoResult<Destination>> + Send;

    /// Applies `changes` to the row matching both `id` and `identity`.
    ///
    /// Returns `None` when zero rows matched. Always rewrites `updated_at`.
    fn update_where(
        &self,
        identity: &Identity,
        id: DestinationId,
        changes: &DestinationChanges,
    ) -> impl Future<Output = RepoResult<Option<Destination>>> + Send;

    /// Deletes the row matching both `id` and `identity`; returns affected rows.
    fn delete_where(
        &self,
        identity: &Identity,
        id: DestinationId,
    ) -> impl Future<Output = RepoResult<u64>> + Send;
}

impl<R: DestinationRepository> DestinationRepository for Arc<R> {
    fn select_where(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = RepoResult<Vec<Destination>>> + Send {
        (**self).select_where(identity)
    }

    fn insert(
        &self,
        identity: &Identity,
        input: &NewDestination,
    ) -> impl Future<Output = RepoResult<Destination>> + Send {
        (**self).insert(identity, input)
    }

    fn update_where(
        &self,
        identity: &Identity,
        id: DestinationId,
        changes: &DestinationChanges,
    ) -> impl Future<Output = RepoResult<Option<Destination>>> + Send {
        (**self).update_where(identity, id, changes)
    }

    fn delete_where(
        &self,
        identity: &Identity,
        id: DestinationId,
    ) -> impl Future<Output = RepoResult<u64>> + Send {
        (**self).delete_where(identity, id)
    }
}

/// Validates a backend row and checks it belongs to `identity`.
pub(crate) fn check_owned_row(identity: &Identity, row: Destination) -> RepoResult<Destination> {
    row.validate()
        .map_err(|err| RepoError::InvalidData(format!("destination {}: {err}", row.id)))?;
    if row.owner_id != identity.user_id {
        return Err(RepoError::InvalidData(format!(
            "destination {} is not owned by the caller identity",
            row.id
        )));
    }
    Ok(row)
}
