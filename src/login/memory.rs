//! In-memory login store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LoginParams, LoginStore};
use crate::Result;

/// Login store that lives for the duration of the process
#[derive(Debug, Default)]
pub struct MemoryLoginStore {
    logins: RwLock<HashMap<String, LoginParams>>,
}

impl MemoryLoginStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored logins
    pub async fn len(&self) -> usize {
        self.logins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.logins.read().await.is_empty()
    }
}

#[async_trait]
impl LoginStore for MemoryLoginStore {
    async fn load(&self, token: &str) -> Result<Option<LoginParams>> {
        Ok(self.logins.read().await.get(token).cloned())
    }

    async fn store(&self, token: &str, params: &LoginParams) -> Result<()> {
        self.logins
            .write()
            .await
            .insert(token.to_string(), params.clone());
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        Ok(self.logins.write().await.remove(token).is_some())
    }
}
