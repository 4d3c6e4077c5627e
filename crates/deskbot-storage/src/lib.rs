//! # deskbot-storage
//!
//! Dual-store persistence for Deskbot.
//!
//! This crate provides:
//! - [`TranscriptStore`]: append-only per-session turn logs, backed by
//!   CouchDB ([`CouchTranscriptStore`]) or process memory
//! - [`SessionIndex`]: relational session metadata, backed by PostgreSQL
//!   ([`PgSessionIndex`]) or process memory
//!
//! The two backends are independent systems with no shared transaction;
//! the ordering discipline that keeps them consistent lives in the session
//! manager, not here.

pub mod index;
pub mod memory;
pub mod transcript;

pub use index::{PgSessionIndex, SessionIndex};
pub use memory::{MemorySessionIndex, MemoryTranscriptStore};
pub use transcript::{CouchTranscriptStore, TranscriptStore};
