//! Group chat coordination server library.
//!
//! Maps ephemeral WebSocket connections to durable identities, arbitrates
//! username claims under concurrent joins, and keeps every member of a group
//! seeing a consistent roster and message order.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// shared library
pub mod common;
