//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for live market data
//! subscriptions with no I/O. All types here are pure Rust with
//! serialization support.

/// Instrument identity and host request types.
pub mod instrument;

/// Provider channel kinds and the category → channel policy.
pub mod channel;

/// Canonical events and provider-native inbound records.
pub mod streaming;

/// Subscription registry and consumer demand tracking.
pub mod subscription;
