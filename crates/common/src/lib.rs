//! Common types for the two-phase commit coordinator
//!
//! This crate defines:
//! - Transaction IDs (UUIDv7-based)
//! - Physical timestamps (microseconds since Unix epoch)
//! - The participant contract every enlisted service implements

mod participant;
mod timestamp;
mod transaction_id;

pub use participant::{Participant, ParticipantError, ParticipantId};
pub use timestamp::Timestamp;
pub use transaction_id::TransactionId;
