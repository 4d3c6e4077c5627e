//! # deskbot-providers
//!
//! Multi-provider completion abstraction for Deskbot.
//!
//! This crate provides:
//! - Provider trait for abstracting completion backends
//! - Implementations for Anthropic and OpenAI
//! - Provider registry and startup selection

pub mod anthropic;
pub mod openai;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use traits::Provider;
