//! # deskbot-session
//!
//! Conversation session management for Deskbot.
//!
//! This crate provides:
//! - [`SessionManager`]: per-turn orchestration across the provider and
//!   both storage backends
//! - Context assembly with window clipping and system-prompt injection
//! - Bounded-backoff retry policy for storage writes
//!
//! ## Consistency discipline
//!
//! The transcript store and session index are independent systems with no
//! shared transaction. `handle_turn` keeps them consistent by ordering:
//! the user turn is persisted before the provider is called (a turn that
//! cannot be recorded is never billed), and the response is appended before
//! the session status is updated. Storage failures after a successful
//! provider call are retried with bounded backoff and, as a last resort,
//! surfaced as an acknowledgement failure with the generated content logged
//! so it is never silently lost.

pub mod context;
pub mod manager;
pub mod retry;

pub use manager::{ManagerConfig, SessionManager};
pub use retry::RetryPolicy;
