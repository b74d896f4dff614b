//! Caller identity boundary.
//!
//! # Responsibility
//! - Represent the authenticated principal that scopes every record query.
//! - Abstract the hosted auth provider behind `IdentityProvider`.
//!
//! # Invariants
//! - Access tokens never appear in `Debug` output or logs.
//! - `SessionIdentity` is the only mutable identity state; callers hold it
//!   explicitly instead of reading a process global.

use crate::model::destination::OwnerId;
use log::info;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Authenticated principal issuing record requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Owner filter applied to every record query.
    pub user_id: OwnerId,
    /// Bearer token forwarded to the hosted backend.
    pub access_token: String,
}

impl Identity {
    pub fn new(user_id: OwnerId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
        }
    }

    /// Fixed identity for the backend-less local store, which has no
    /// multi-user concept.
    pub fn local() -> Self {
        Self::new(Uuid::nil(), String::new())
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Source of the current caller identity.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in identity, if any.
    fn current_identity(&self) -> Option<Identity>;
    /// Drops the current identity.
    fn sign_out(&self);
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    fn current_identity(&self) -> Option<Identity> {
        (**self).current_identity()
    }

    fn sign_out(&self) {
        (**self).sign_out()
    }
}

/// In-memory identity holder updated by the host on auth state changes.
#[derive(Default)]
pub struct SessionIdentity {
    current: RwLock<Option<Identity>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    /// Replaces the current identity.
    pub fn sign_in(&self, identity: Identity) {
        info!(
            "event=identity_sign_in module=identity status=ok user_id={}",
            identity.user_id
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sign_out(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(identity) = previous {
            info!(
                "event=identity_sign_out module=identity status=ok user_id={}",
                identity.user_id
            );
        }
    }
}
