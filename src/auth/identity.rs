//! A user identity lives in two places: the main registry row and, once the
//! user has logged in or been provisioned, a row in the company database.
//! Credential writes go through [`Identity`] so both copies stay in step.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db;
use crate::error::AppError;
use crate::state::AppState;
use crate::tenancy::TenantCode;

/// Where the identity's primary record was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimaryStore {
    Company,
    Registry,
}

pub struct Identity {
    pub code: TenantCode,
    pub email: String,
    pub name: String,
    pub primary: PrimaryStore,
    tenant_pool: Option<PgPool>,
}

impl Identity {
    /// Look up a user by email, company store first.
    ///
    /// Unregistered companies have no users and their database is never
    /// touched. An unreachable company database is logged and the registry
    /// is used.
    pub async fn find(
        state: &AppState,
        code: &TenantCode,
        email: &str,
    ) -> Result<Option<Identity>, AppError> {
        if !db::companies::exists(&state.pool, code.as_str()).await? {
            return Ok(None);
        }
        let tenant_pool = tenant_pool(state, code).await;

        if let Some(pool) = &tenant_pool {
            if let Some(user) = db::tenant_users::find_by_email(pool, email).await? {
                return Ok(Some(Identity {
                    code: code.clone(),
                    email: user.email,
                    name: user.name,
                    primary: PrimaryStore::Company,
                    tenant_pool,
                }));
            }
        }

        let registry = db::users::find_by_email(&state.pool, code.as_str(), email).await?;
        Ok(registry.map(|user| Identity {
            code: code.clone(),
            email: user.email,
            name: user.name,
            primary: PrimaryStore::Registry,
            tenant_pool,
        }))
    }

    /// Look up a user holding an unexpired reset token with this hash.
    pub async fn find_by_reset_token(
        state: &AppState,
        code: &TenantCode,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<Identity>, AppError> {
        if !db::companies::exists(&state.pool, code.as_str()).await? {
            return Ok(None);
        }
        let tenant_pool = tenant_pool(state, code).await;

        if let Some(pool) = &tenant_pool {
            if let Some(user) =
                db::tenant_users::find_by_reset_token(pool, email, token_hash).await?
            {
                return Ok(Some(Identity {
                    code: code.clone(),
                    email: user.email,
                    name: user.name,
                    primary: PrimaryStore::Company,
                    tenant_pool,
                }));
            }
        }

        let registry =
            db::users::find_by_reset_token(&state.pool, code.as_str(), email, token_hash).await?;
        Ok(registry.map(|user| Identity {
            code: code.clone(),
            email: user.email,
            name: user.name,
            primary: PrimaryStore::Registry,
            tenant_pool,
        }))
    }

    /// Set (or clear, with `None`) the reset token on both copies.
    pub async fn set_reset_token(
        &self,
        registry: &PgPool,
        token_hash: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        if self.primary == PrimaryStore::Company {
            if let Some(pool) = &self.tenant_pool {
                db::tenant_users::set_reset_token(pool, &self.email, token_hash, expires_at)
                    .await?;
            }
        }
        db::users::set_reset_token(registry, self.code.as_str(), &self.email, token_hash, expires_at)
            .await?;
        Ok(())
    }

    /// Replace the password hash on both copies, consuming any reset token.
    ///
    /// The primary copy must succeed; a failure on the secondary is logged.
    pub async fn set_password(&self, registry: &PgPool, password_hash: &str) -> Result<(), AppError> {
        let registry_update =
            db::users::update_password(registry, self.code.as_str(), &self.email, password_hash);

        match (self.primary, &self.tenant_pool) {
            (PrimaryStore::Company, Some(pool)) => {
                db::tenant_users::update_password(pool, &self.email, password_hash).await?;
                if let Err(e) = registry_update.await {
                    tracing::error!("Error updating registry password for {}: {e}", self.email);
                }
            }
            (_, tenant_pool) => {
                registry_update.await?;
                if let Some(pool) = tenant_pool {
                    if let Err(e) =
                        db::tenant_users::update_password(pool, &self.email, password_hash).await
                    {
                        tracing::error!("Error updating company password for {}: {e}", self.email);
                    }
                }
            }
        }
        Ok(())
    }
}

async fn tenant_pool(state: &AppState, code: &TenantCode) -> Option<PgPool> {
    match state.tenants.get_code(code).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::error!("Error accessing company database for {code}: {e}");
            None
        }
    }
}
