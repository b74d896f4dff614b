//! Core domain logic for TravelMap.
//! Owner-scoped destination access plus the client-side mirror built on it.

pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ClientConfig, ConfigError};
pub use identity::{Identity, IdentityProvider, SessionIdentity};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::destination::{
    Category, Destination, DestinationDraft, DestinationFilter, DestinationId, DestinationPatch,
    DestinationValidationError, OwnerId,
};
pub use repo::{
    DestinationRepository, RepoError, RepoResult, RestDestinationRepository,
    SqliteDestinationRepository,
};
pub use service::destination_service::{AccessError, AccessResult, DestinationService, Operation};
pub use sync::destination_sync::{DestinationSync, SyncPhase, SyncSnapshot};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
