//! Client-side state synchronization.
//!
//! # Responsibility
//! - Mirror the caller's destinations in memory for the presentation layer.
//!
//! # Invariants
//! - Results are applied only while their identity session is still current.

pub mod destination_sync;
