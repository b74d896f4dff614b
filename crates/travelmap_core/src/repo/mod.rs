//! Record backend abstractions and implementations.
//!
//! # Responsibility
//! - Define the owner-scoped filtered-table contract used by the access layer.
//! - Isolate SQL and HTTP details from service orchestration.
//!
//! # Invariants
//! - Every verb filters by `owner_id = identity.user_id`.
//! - Read paths validate rows and reject rows owned by another identity
//!   instead of masking them.

pub mod destination_repo;
pub mod rest;
pub mod sqlite;

pub use destination_repo::{DestinationRepository, RepoError, RepoResult};
pub use rest::RestDestinationRepository;
pub use sqlite::SqliteDestinationRepository;
