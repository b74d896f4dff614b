//! Client-side destination mirror and its refresh/patch logic.
//!
//! # Responsibility
//! - Keep an in-memory, newest-first copy of the signed-in identity's records.
//! - Expose loading, load-error and mutation-error status to the presentation layer.
//! - Patch the mirror from server-returned records instead of re-fetching.
//!
//! # Invariants
//! - The state lock is never held across an await point.
//! - Every identity session has its own generation and cancellation token;
//!   results from an older session are discarded, never applied.
//! - A failed mutation never changes the phase or the records.
//! - Only a failed list moves the phase to `Error`.
//! - Mutations applied while a list is in flight are replayed on top of the
//!   list result, so a slower read never undoes a newer write.

use crate::identity::{Identity, IdentityProvider};
use crate::model::destination::{
    Category, Destination, DestinationDraft, DestinationFilter, DestinationId, DestinationPatch,
};
use crate::repo::destination_repo::DestinationRepository;
use crate::service::destination_service::{AccessError, DestinationService, Operation};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Lifecycle phase of the mirror for the current identity session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    /// Full list failed; holds a human-readable message. Left only via `refresh`.
    Error(String),
}

/// Point-in-time view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub records: Vec<Destination>,
    pub is_loading: bool,
    /// Message of the last failed list, if the phase is `Error`.
    pub error_message: Option<String>,
    /// Message of the last failed add/update/delete, shown inline.
    pub mutation_error: Option<String>,
}

struct Session {
    identity: Identity,
    generation: u64,
    cancel: CancellationToken,
}

impl Session {
    fn ticket(&self) -> Ticket {
        Ticket {
            identity: self.identity.clone(),
            generation: self.generation,
            cancel: self.cancel.clone(),
        }
    }
}

/// Server-confirmed change to the mirror.
#[derive(Debug, Clone)]
enum MirrorEdit {
    Created(Destination),
    Updated(Destination),
    Removed(DestinationId),
}

impl MirrorEdit {
    fn apply_to(&self, records: &mut Vec<Destination>) {
        match self {
            Self::Created(created) => {
                if !records.iter().any(|record| record.id == created.id) {
                    records.insert(0, created.clone());
                }
            }
            Self::Updated(updated) => {
                if let Some(slot) = records.iter_mut().find(|record| record.id == updated.id) {
                    // A list read after this update may already carry a newer copy.
                    if updated.updated_at >= slot.updated_at {
                        *slot = updated.clone();
                    }
                }
            }
            Self::Removed(id) => records.retain(|record| record.id != *id),
        }
    }
}

#[derive(Clone)]
struct Ticket {
    identity: Identity,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SyncState {
    phase: SyncPhase,
    records: Vec<Destination>,
    mutation_error: Option<String>,
    session: Option<Session>,
    last_generation: u64,
    load_seq: u64,
    /// Edits applied since the in-flight list started.
    edits_during_load: Vec<MirrorEdit>,
}

impl SyncState {
    /// Returns a ticket for `identity`, starting a fresh session when the
    /// owner differs from the active one.
    fn begin_session(&mut self, identity: Identity) -> Ticket {
        let session = match self.session.take() {
            Some(mut session) if session.identity.user_id == identity.user_id => {
                // Same owner; keep the session but pick up a refreshed token.
                session.identity = identity;
                session
            }
            previous => {
                if let Some(previous) = previous {
                    previous.cancel.cancel();
                }
                self.reset();
                self.last_generation += 1;
                Session {
                    identity,
                    generation: self.last_generation,
                    cancel: CancellationToken::new(),
                }
            }
        };
        let ticket = session.ticket();
        self.session = Some(session);
        ticket
    }

    fn owns_session(&self, identity: &Identity) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.identity.user_id == identity.user_id)
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.generation == ticket.generation)
    }

    fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
        self.phase = SyncPhase::Uninitialized;
        self.records.clear();
        self.mutation_error = None;
        self.edits_during_load.clear();
    }

    fn apply_edit(&mut self, edit: MirrorEdit) {
        edit.apply_to(&mut self.records);
        if self.phase == SyncPhase::Loading {
            self.edits_during_load.push(edit);
        }
    }

    /// Installs a fresh list, replaying edits made while it was in flight.
    fn install_list(&mut self, mut records: Vec<Destination>) -> usize {
        let replayed = self.edits_during_load.len();
        for edit in self.edits_during_load.drain(..) {
            edit.apply_to(&mut records);
        }
        self.records = records;
        self.phase = SyncPhase::Ready;
        replayed
    }
}

/// Explicitly constructed state holder mirroring one identity's destinations.
///
/// All operations take `&self`; several may be in flight at once. When
/// updates race, the last response applied wins.
pub struct DestinationSync<R: DestinationRepository, P: IdentityProvider> {
    service: DestinationService<R, P>,
    state: Mutex<SyncState>,
}

impl<R: DestinationRepository, P: IdentityProvider> DestinationSync<R, P> {
    pub fn new(service: DestinationService<R, P>) -> Self {
        Self {
            service,
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn service(&self) -> &DestinationService<R, P> {
        &self.service
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.lock();
        let error_message = match &state.phase {
            SyncPhase::Error(message) => Some(message.clone()),
            _ => None,
        };
        SyncSnapshot {
            phase: state.phase.clone(),
            records: state.records.clone(),
            is_loading: state.phase == SyncPhase::Loading,
            error_message,
            mutation_error: state.mutation_error.clone(),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.lock().phase.clone()
    }

    pub fn records(&self) -> Vec<Destination> {
        self.lock().records.clone()
    }

    /// Records matching `filter`, in mirror order.
    pub fn filtered(&self, filter: &DestinationFilter) -> Vec<Destination> {
        self.lock()
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    /// Shorthand for a text search with an optional category restriction.
    pub fn search(&self, query: &str, category: Option<Category>) -> Vec<Destination> {
        self.filtered(&DestinationFilter::new(query).with_category(category))
    }

    pub fn clear_mutation_error(&self) {
        self.lock().mutation_error = None;
    }

    /// Reconciles the mirror with the provider's current identity.
    ///
    /// - No identity: resets to `Uninitialized`.
    /// - Same owner as the active session: keeps records, picks up the token.
    /// - New owner (or no session yet): starts a session and loads it.
    pub async fn identity_changed(&self) {
        let Some(identity) = self.service.current_identity() else {
            self.reset("identity_unavailable");
            return;
        };

        {
            let mut state = self.lock();
            if state.owns_session(&identity) {
                state.begin_session(identity);
                return;
            }
        }

        self.refresh().await;
    }

    /// Signs out through the provider and resets the mirror.
    pub fn sign_out(&self) {
        self.service.sign_out();
        self.reset("sign_out");
    }

    /// Reloads the full list. This is also the retry path out of `Error`.
    pub async fn refresh(&self) {
        let Some(identity) = self.service.current_identity() else {
            self.reset("identity_unavailable");
            return;
        };

        let (ticket, load_seq) = {
            let mut state = self.lock();
            let ticket = state.begin_session(identity);
            state.phase = SyncPhase::Loading;
            state.load_seq += 1;
            state.edits_during_load.clear();
            (ticket, state.load_seq)
        };
        info!(
            "event=sync_refresh module=sync status=start generation={} user_id={}",
            ticket.generation, ticket.identity.user_id
        );

        let Some(outcome) =
            run_cancellable(&ticket.cancel, self.service.list_as(&ticket.identity)).await
        else {
            log_discarded(Operation::List, &ticket, "cancelled");
            return;
        };

        let mut state = self.lock();
        if !state.is_current(&ticket) || state.load_seq != load_seq {
            log_discarded(Operation::List, &ticket, "stale");
            return;
        }
        match outcome {
            Ok(records) => {
                let count = records.len();
                let replayed = state.install_list(records);
                info!(
                    "event=sync_refresh module=sync status=ok generation={} count={} replayed_edits={}",
                    ticket.generation, count, replayed
                );
            }
            Err(err) => {
                warn!(
                    "event=sync_refresh module=sync status=error generation={} error={}",
                    ticket.generation, err
                );
                state.edits_during_load.clear();
                state.phase = SyncPhase::Error(err.to_string());
            }
        }
    }

    /// Creates a destination and prepends the server record.
    ///
    /// Returns `None` on failure; the message is kept in `mutation_error`.
    pub async fn add(&self, draft: DestinationDraft) -> Option<Destination> {
        let ticket = self.mutation_ticket(Operation::Create)?;
        let outcome = run_cancellable(
            &ticket.cancel,
            self.service.create_as(&ticket.identity, draft),
        )
        .await;

        self.apply_mutation(Operation::Create, &ticket, outcome, |created| {
            MirrorEdit::Created(created.clone())
        })
    }

    /// Updates a destination and replaces the local copy with the server record.
    pub async fn update(&self, id: DestinationId, patch: DestinationPatch) -> Option<Destination> {
        let ticket = self.mutation_ticket(Operation::Update)?;
        let outcome = run_cancellable(
            &ticket.cancel,
            self.service.update_as(&ticket.identity, id, patch),
        )
        .await;

        self.apply_mutation(Operation::Update, &ticket, outcome, |updated| {
            MirrorEdit::Updated(updated.clone())
        })
    }

    /// Deletes a destination and removes it locally. Returns success.
    pub async fn delete(&self, id: DestinationId) -> bool {
        let Some(ticket) = self.mutation_ticket(Operation::Delete) else {
            return false;
        };
        let outcome =
            run_cancellable(&ticket.cancel, self.service.delete_as(&ticket.identity, id)).await;

        self.apply_mutation(Operation::Delete, &ticket, outcome, |()| MirrorEdit::Removed(id))
        .is_some()
    }

    fn mutation_ticket(&self, operation: Operation) -> Option<Ticket> {
        let current = self.service.current_identity();
        let mut state = self.lock();
        state.mutation_error = None;

        let ticket = match current {
            None => {
                state.reset();
                None
            }
            Some(identity) if state.owns_session(&identity) => Some(state.begin_session(identity)),
            Some(_) => None,
        };

        if ticket.is_none() {
            warn!(
                "event=sync_{} module=sync status=error error_code=no_active_session",
                operation.as_str()
            );
            state.mutation_error = Some(AccessError::AuthenticationRequired.to_string());
        }
        ticket
    }

    fn apply_mutation<T>(
        &self,
        operation: Operation,
        ticket: &Ticket,
        outcome: Option<Result<T, AccessError>>,
        edit: impl FnOnce(&T) -> MirrorEdit,
    ) -> Option<T> {
        let Some(result) = outcome else {
            log_discarded(operation, ticket, "cancelled");
            return None;
        };

        let mut state = self.lock();
        if !state.is_current(ticket) {
            log_discarded(operation, ticket, "stale");
            return None;
        }
        match result {
            Ok(value) => {
                state.apply_edit(edit(&value));
                debug!(
                    "event=sync_{} module=sync status=ok generation={} count={}",
                    operation.as_str(),
                    ticket.generation,
                    state.records.len()
                );
                Some(value)
            }
            Err(err) => {
                warn!(
                    "event=sync_{} module=sync status=error generation={} error={}",
                    operation.as_str(),
                    ticket.generation,
                    err
                );
                state.mutation_error = Some(err.to_string());
                None
            }
        }
    }

    fn reset(&self, reason: &str) {
        self.lock().reset();
        info!("event=sync_reset module=sync status=ok reason={reason}");
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Races `task` against session cancellation. Dropping the task discards its
/// response; a write the backend already accepted is not rolled back.
async fn run_cancellable<F: Future>(cancel: &CancellationToken, task: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = task => Some(output),
    }
}

fn log_discarded(operation: Operation, ticket: &Ticket, reason: &str) {
    info!(
        "event=sync_{} module=sync status=discarded reason={} generation={}",
        operation.as_str(),
        reason,
        ticket.generation
    );
}

#[cfg(test)]
mod tests {
    use super::{MirrorEdit, SyncPhase, SyncState};
    use crate::model::destination::{Category, Destination};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(name: &str) -> Destination {
        let now = Utc::now();
        Destination {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            name: name.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            category: Category::Other,
            visited: false,
            visit_date: None,
            notes: None,
            rating: None,
            photos: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn install_list_replays_edits_made_while_loading() {
        let kept = record("kept");
        let removed = record("removed");
        let created = record("created");
        let mut renamed = kept.clone();
        renamed.name = "renamed".to_string();
        renamed.updated_at = kept.updated_at + Duration::milliseconds(5);

        let mut state = SyncState {
            phase: SyncPhase::Loading,
            ..SyncState::default()
        };
        state.apply_edit(MirrorEdit::Created(created.clone()));
        state.apply_edit(MirrorEdit::Updated(renamed.clone()));
        state.apply_edit(MirrorEdit::Removed(removed.id));
        assert_eq!(state.edits_during_load.len(), 3);

        let replayed = state.install_list(vec![kept, removed]);

        assert_eq!(replayed, 3);
        assert_eq!(state.phase, SyncPhase::Ready);
        assert_eq!(state.records, vec![created, renamed]);
        assert!(state.edits_during_load.is_empty());
    }

    #[test]
    fn replayed_update_never_replaces_a_newer_listed_copy() {
        let stale = record("stale");
        let mut fresh = stale.clone();
        fresh.name = "fresh".to_string();
        fresh.updated_at = stale.updated_at + Duration::milliseconds(1);

        let mut records = vec![fresh.clone()];
        MirrorEdit::Updated(stale).apply_to(&mut records);
        MirrorEdit::Created(fresh.clone()).apply_to(&mut records);

        assert_eq!(records, vec![fresh]);
    }

    #[test]
    fn edits_outside_loading_are_not_journaled() {
        let mut state = SyncState {
            phase: SyncPhase::Ready,
            ..SyncState::default()
        };
        state.apply_edit(MirrorEdit::Created(record("added")));
        assert_eq!(state.records.len(), 1);
        assert!(state.edits_during_load.is_empty());
    }
}
