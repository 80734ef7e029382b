//! Data Transfer Objects (DTOs) for the coordinator.
//!
//! - `ws`: WebSocket event payloads (the `{event, data}` wire contract)
//! - `conversion`: domain/usecase types → wire payloads

pub mod conversion;
pub mod ws;
