//! Provider trait definitions.

use async_trait::async_trait;

use deskbot_core::{ProviderError, Turn};

/// Core provider trait - all completion backends implement this.
///
/// Adapters translate between the neutral [`Turn`] representation and
/// their backend's wire format, and own their credential handling. They
/// perform no local persistence and no retries of their own.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, as recorded on sessions and agent turns.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Check if provider is configured and ready.
    fn is_configured(&self) -> bool;

    /// Generate the next agent turn from an ordered context of prior turns.
    ///
    /// The context may contain one system turn, which adapters route to
    /// their backend's system-prompt channel. The returned turn carries a
    /// provisional sequence number (one past the context tail); the caller
    /// assigns the durable sequence before persisting.
    async fn generate(&self, context: &[Turn]) -> Result<Turn, ProviderError>;
}
