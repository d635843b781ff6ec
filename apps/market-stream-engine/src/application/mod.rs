//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the provider session, identifier mapping and sinks.
pub mod ports;

/// Application services for subscription control and ingestion.
pub mod services;
