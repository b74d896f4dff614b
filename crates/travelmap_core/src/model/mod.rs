//! Domain model for saved travel destinations.
//!
//! # Responsibility
//! - Define the canonical destination record and its input shapes.
//! - Own validation and empty-input normalization rules.
//!
//! # Invariants
//! - Every destination is identified by a stable `DestinationId`.
//! - Every destination belongs to exactly one `OwnerId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod destination;
