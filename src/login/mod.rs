//! Session/login gateway
//!
//! A [`Login`] is a resolved, mutable session identity keyed by an opaque
//! token. Persistence is delegated to a [`LoginStore`]; the host and plugins
//! only ever hold transient `Login` values resolved through the
//! [`LoginGateway`].

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{Error, Result};

pub use memory::MemoryLoginStore;
pub use sqlite::SqliteLoginStore;

/// Attributes derived for an authenticated session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginParams {
    pub is_login: bool,
    pub is_valid_password: bool,
    pub email: String,
    pub user_name: String,
    pub im_user_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub main_domain: String,
    pub platform_domain: String,
    /// JSON-encoded permission document
    pub admin_permissions: String,
    pub admin_login: i64,
    pub site_admin: bool,
    pub activation_key: String,
    pub authentication_required: bool,
    pub passcode_activation_required: bool,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub device_type: String,
    pub device_name: String,
    pub is_valid_second_auth: bool,
    #[serde(rename = "clientauthtype")]
    pub client_auth_type: String,
    #[serde(rename = "secondauthmethod")]
    pub second_auth_method: String,
    pub second_auth_type: String,
    pub otp_tries_counter: u32,
    pub first_login: bool,
}

/// Persistence backend for logins
///
/// Implementations must not block the calling task; synchronous backends
/// hand work to a blocking thread.
#[async_trait]
pub trait LoginStore: Send + Sync {
    /// Load the params stored under `token`
    async fn load(&self, token: &str) -> Result<Option<LoginParams>>;

    /// Insert or overwrite the params stored under `token`
    async fn store(&self, token: &str, params: &LoginParams) -> Result<()>;

    /// Remove the record, returning whether it existed
    async fn remove(&self, token: &str) -> Result<bool>;
}

/// A resolved login
///
/// The valid flag is in-memory only: it is never persisted and starts out
/// `false` every time a `Login` is reconstructed from storage. Clones share
/// one save guard, so at most one `save` per login is in flight.
#[derive(Clone)]
pub struct Login {
    token: String,
    params: LoginParams,
    valid: bool,
    store: Arc<dyn LoginStore>,
    save_guard: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("email", &self.params.email)
            .field("is_admin", &self.params.is_admin)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl Login {
    fn new(token: String, params: LoginParams, store: Arc<dyn LoginStore>) -> Self {
        Self {
            token,
            params,
            valid: false,
            store,
            save_guard: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub const fn params(&self) -> &LoginParams {
        &self.params
    }

    pub const fn params_mut(&mut self) -> &mut LoginParams {
        &mut self.params
    }

    /// Whether the session holds administrator rights
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.params.is_admin || self.params.site_admin
    }

    /// Permission document parsed from `adminPermissions`
    ///
    /// Falls back to the raw string when it is not JSON.
    #[must_use]
    pub fn permissions(&self) -> serde_json::Value {
        if self.params.admin_permissions.is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_str(&self.params.admin_permissions)
            .unwrap_or_else(|_| serde_json::Value::String(self.params.admin_permissions.clone()))
    }

    pub const fn set_valid_login(&mut self, valid: bool) {
        self.valid = valid;
    }

    #[must_use]
    pub const fn is_valid_login(&self) -> bool {
        self.valid
    }

    /// Persist the current params
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_guard.lock().await;
        self.store.store(&self.token, &self.params).await
    }

    /// Remove the persisted record
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.save_guard.lock().await;
        self.store.remove(&self.token).await?;
        Ok(())
    }
}

/// Resolves tokens to logins
#[derive(Clone)]
pub struct LoginGateway {
    store: Arc<dyn LoginStore>,
}

impl LoginGateway {
    #[must_use]
    pub fn new(store: Arc<dyn LoginStore>) -> Self {
        Self { store }
    }

    /// Gateway backed by an in-memory store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLoginStore::new()))
    }

    /// Resolve a token
    ///
    /// `Ok(None)` means the token is unknown. Store failures are reported as
    /// [`Error::LoginResolution`] and must not be treated as anonymous.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached
    pub async fn get_login(&self, token: &str) -> Result<Option<Login>> {
        let params = self.store.load(token).await.map_err(|e| {
            tracing::warn!(error = %e, "login store lookup failed");
            Error::LoginResolution(e.to_string())
        })?;

        Ok(params.map(|params| Login::new(token.to_string(), params, Arc::clone(&self.store))))
    }

    /// Mint a token for `params` and persist it
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write
    pub async fn create_login(&self, params: LoginParams) -> Result<Login> {
        let token = Uuid::new_v4().to_string();
        self.store.store(&token, &params).await?;
        tracing::debug!(email = %params.email, "login created");
        Ok(Login::new(token, params, Arc::clone(&self.store)))
    }
}

impl std::fmt::Debug for LoginGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGateway").finish_non_exhaustive()
    }
}
