use async_trait::async_trait;
use models::AuthSession;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::actor::SavingsActor;
use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub identity_provider_url: String,
    pub canister_id: String,
}

/// Source of the user's principal (Internet Identity in production).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principal of an identity that is still signed in, if any.
    async fn restore(&self) -> Result<Option<String>>;
    async fn login(&self, identity_provider_url: &str) -> Result<String>;
    async fn logout(&self) -> Result<()>;
}

/// Identity provider that always signs in as one configured principal.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    principal: Option<String>,
}

impl StaticIdentityProvider {
    pub fn new(principal: Option<String>) -> Self {
        Self { principal }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn restore(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn login(&self, _identity_provider_url: &str) -> Result<String> {
        self.principal
            .clone()
            .ok_or_else(|| ServiceError::Auth("no principal configured (set SAVR_PRINCIPAL)".to_string()))
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}

/// An authenticated handle on the savings canister.
#[derive(Clone)]
pub struct ActorHandle {
    pub actor: Arc<dyn SavingsActor>,
    pub principal: String,
}

/// Session state for the signed-in user, shared by every screen.
pub struct AuthService {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
    actor: Arc<dyn SavingsActor>,
    session: RwLock<AuthSession>,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        actor: Arc<dyn SavingsActor>,
    ) -> Self {
        Self {
            config,
            provider,
            actor,
            session: RwLock::new(AuthSession::default()),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Restores an existing identity on startup.
    pub async fn init(&self) -> Result<()> {
        self.set_loading(true).await;
        tracing::info!(canister_id = %self.config.canister_id, "initializing auth");
        match self.provider.restore().await {
            Ok(principal) => {
                self.set_principal(principal).await;
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to restore identity");
                self.set_loading(false).await;
                Err(err)
            }
        }
    }

    pub async fn login(&self) -> Result<String> {
        self.set_loading(true).await;
        match self.provider.login(&self.config.identity_provider_url).await {
            Ok(principal) => {
                tracing::info!(principal = %principal, "logged in");
                self.set_principal(Some(principal.clone())).await;
                Ok(principal)
            }
            Err(err) => {
                tracing::error!(error = %err, "login failed");
                self.set_loading(false).await;
                Err(err)
            }
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.set_loading(true).await;
        let result = self.provider.logout().await;
        match &result {
            Ok(()) => {
                tracing::info!("logged out");
                self.set_principal(None).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "logout failed");
                self.set_loading(false).await;
            }
        }
        result
    }

    pub async fn session(&self) -> AuthSession {
        self.session.read().await.clone()
    }

    pub async fn principal(&self) -> Option<String> {
        self.session.read().await.principal.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated
    }

    pub async fn is_loading(&self) -> bool {
        self.session.read().await.is_loading
    }

    /// Canister handle for the current principal.
    pub async fn actor(&self) -> Result<ActorHandle> {
        let principal = self.principal().await.ok_or(ServiceError::NotAuthenticated)?;
        Ok(ActorHandle {
            actor: Arc::clone(&self.actor),
            principal,
        })
    }

    async fn set_loading(&self, loading: bool) {
        self.session.write().await.is_loading = loading;
    }

    async fn set_principal(&self, principal: Option<String>) {
        let mut session = self.session.write().await;
        session.is_authenticated = principal.is_some();
        session.principal = principal;
        session.is_loading = false;
    }
}
