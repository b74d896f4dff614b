//! Destination record access layer.
//!
//! # Responsibility
//! - Expose list/create/update/delete scoped to the caller identity.
//! - Validate and normalize payloads before they reach a backend.
//! - Collapse backend faults into one opaque failure per operation.
//!
//! # Invariants
//! - No repository call is issued without an identity.
//! - `owner_id` always comes from the identity, never from the payload.
//! - Update on a missing or foreign id is `NotFound`; delete on one is a no-op.

use crate::identity::{Identity, IdentityProvider};
use crate::model::destination::{
    Destination, DestinationDraft, DestinationId, DestinationPatch, DestinationValidationError,
};
use crate::repo::destination_repo::{DestinationRepository, RepoError};
use log::{debug, error, info, warn};
use std::fmt::{Display, Formatter};
use std::time::Instant;
use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

/// Logical operation of the access layer, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let action = match self {
            Self::List => "fetch destinations",
            Self::Create => "add destination",
            Self::Update => "update destination",
            Self::Delete => "delete destination",
        };
        f.write_str(action)
    }
}

/// Access-layer failure taxonomy.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("User not authenticated")]
    AuthenticationRequired,
    #[error(transparent)]
    Validation(#[from] DestinationValidationError),
    /// Either missing or owned by another identity; the two are indistinguishable.
    #[error("destination not found: {0}")]
    NotFound(DestinationId),
    #[error("Failed to {operation}: {message}")]
    BackendFailure {
        operation: Operation,
        message: String,
    },
}

/// Use-case service over an owner-scoped destination repository.
pub struct DestinationService<R: DestinationRepository, P: IdentityProvider> {
    repo: R,
    identity: P,
}

impl<R: DestinationRepository, P: IdentityProvider> DestinationService<R, P> {
    pub fn new(repo: R, identity: P) -> Self {
        Self { repo, identity }
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.current_identity()
    }

    pub fn sign_out(&self) {
        self.identity.sign_out();
    }

    /// Lists the caller's destinations, newest first.
    ///
    /// Zero owned records is an empty list, not an error.
    pub async fn list(&self) -> AccessResult<Vec<Destination>> {
        let identity = self.require_identity(Operation::List)?;
        self.list_as(&identity).await
    }

    /// Creates a destination owned by the caller.
    pub async fn create(&self, draft: DestinationDraft) -> AccessResult<Destination> {
        let identity = self.require_identity(Operation::Create)?;
        self.create_as(&identity, draft).await
    }

    /// Applies a partial update to one of the caller's destinations.
    pub async fn update(
        &self,
        id: DestinationId,
        patch: DestinationPatch,
    ) -> AccessResult<Destination> {
        let identity = self.require_identity(Operation::Update)?;
        self.update_as(&identity, id, patch).await
    }

    /// Deletes one of the caller's destinations. Idempotent.
    pub async fn delete(&self, id: DestinationId) -> AccessResult<()> {
        let identity = self.require_identity(Operation::Delete)?;
        self.delete_as(&identity, id).await
    }

    /// `list` pinned to an already resolved identity.
    pub async fn list_as(&self, identity: &Identity) -> AccessResult<Vec<Destination>> {
        let started_at = Instant::now();
        let destinations = self
            .repo
            .select_where(identity)
            .await
            .map_err(|err| backend_failure(Operation::List, err))?;

        info!(
            "event=destination_list module=service status=ok user_id={} count={} duration_ms={}",
            identity.user_id,
            destinations.len(),
            started_at.elapsed().as_millis()
        );
        Ok(destinations)
    }

    /// `create` pinned to an already resolved identity.
    pub async fn create_as(
        &self,
        identity: &Identity,
        draft: DestinationDraft,
    ) -> AccessResult<Destination> {
        if let Some(claimed) = draft.owner_id.filter(|claimed| *claimed != identity.user_id) {
            warn!(
                "event=destination_create module=service status=owner_override user_id={} claimed_owner={}",
                identity.user_id, claimed
            );
        }
        let input = draft
            .normalize()
            .inspect_err(|err| log_rejected(Operation::Create, err))?;

        let created = self
            .repo
            .insert(identity, &input)
            .await
            .map_err(|err| backend_failure(Operation::Create, err))?;

        info!(
            "event=destination_create module=service status=ok user_id={} destination_id={}",
            identity.user_id, created.id
        );
        Ok(created)
    }

    /// `update` pinned to an already resolved identity.
    pub async fn update_as(
        &self,
        identity: &Identity,
        id: DestinationId,
        patch: DestinationPatch,
    ) -> AccessResult<Destination> {
        let changes = patch
            .normalize()
            .inspect_err(|err| log_rejected(Operation::Update, err))?;
        if changes.is_empty() {
            debug!(
                "event=destination_update module=service status=touch_only user_id={} destination_id={}",
                identity.user_id, id
            );
        }

        let updated = self
            .repo
            .update_where(identity, id, &changes)
            .await
            .map_err(|err| backend_failure(Operation::Update, err))?;

        match updated {
            Some(destination) => {
                info!(
                    "event=destination_update module=service status=ok user_id={} destination_id={}",
                    identity.user_id, id
                );
                Ok(destination)
            }
            None => {
                info!(
                    "event=destination_update module=service status=not_found user_id={} destination_id={}",
                    identity.user_id, id
                );
                Err(AccessError::NotFound(id))
            }
        }
    }

    /// `delete` pinned to an already resolved identity.
    pub async fn delete_as(&self, identity: &Identity, id: DestinationId) -> AccessResult<()> {
        let affected = self
            .repo
            .delete_where(identity, id)
            .await
            .map_err(|err| backend_failure(Operation::Delete, err))?;

        if affected == 0 {
            debug!(
                "event=destination_delete module=service status=noop user_id={} destination_id={}",
                identity.user_id, id
            );
        } else {
            info!(
                "event=destination_delete module=service status=ok user_id={} destination_id={}",
                identity.user_id, id
            );
        }
        Ok(())
    }

    fn require_identity(&self, operation: Operation) -> AccessResult<Identity> {
        self.identity.current_identity().ok_or_else(|| {
            warn!(
                "event=destination_{} module=service status=error error_code=auth_required",
                operation.as_str()
            );
            AccessError::AuthenticationRequired
        })
    }
}

fn backend_failure(operation: Operation, err: RepoError) -> AccessError {
    error!(
        "event=destination_{} module=service status=error error_code=backend_failure error={}",
        operation.as_str(),
        err
    );
    AccessError::BackendFailure {
        operation,
        message: err.to_string(),
    }
}

fn log_rejected(operation: Operation, err: &DestinationValidationError) {
    warn!(
        "event=destination_{} module=service status=error error_code=validation error={}",
        operation.as_str(),
        err
    );
}

#[cfg(test)]
mod tests {
    use super::{AccessError, Operation};

    #[test]
    fn backend_failure_message_names_the_operation() {
        let err = AccessError::BackendFailure {
            operation: Operation::List,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch destinations: connection refused"
        );
    }
}
