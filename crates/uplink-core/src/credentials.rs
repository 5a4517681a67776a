//! Credential provider seam.
//!
//! The gateway never owns token lifecycle; it asks the provider for the
//! current bearer token and, after a 401, for exactly one refresh.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;
use uplink_types::GatewayError;

/// Source of bearer tokens for outbound requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` for anonymous requests.
    async fn get_token(&self) -> Result<Option<String>, GatewayError>;

    /// Obtain a fresh token after the upstream rejected the current one.
    async fn refresh_token(&self) -> Result<Option<String>, GatewayError>;
}

/// Fixed token; refreshing returns the same value.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token: RwLock::new(token) }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<Option<String>, GatewayError> {
        Ok(self.token.read().clone())
    }

    async fn refresh_token(&self) -> Result<Option<String>, GatewayError> {
        Ok(self.token.read().clone())
    }
}

/// Serializes refreshes so concurrent 401s share one provider call.
#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    lock: Mutex<()>,
}

impl RefreshGate {
    /// Refresh unless another request already replaced `rejected`.
    pub(crate) async fn refresh(
        &self,
        provider: &dyn CredentialProvider,
        rejected: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        let _guard = self.lock.lock().await;

        // After acquiring lock: check if another request already refreshed
        let current = provider.get_token().await?;
        if current.is_some() && current.as_deref() != rejected {
            debug!("Token already refreshed by a concurrent request");
            return Ok(current);
        }

        debug!("Refreshing credentials after auth failure");
        provider.refresh_token().await
    }
}
