//! `SQLite`-backed login store

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use super::{LoginParams, LoginStore};
use crate::db::{DbPool, connection};
use crate::{Error, Result};

/// Login store persisted in the host database
///
/// Pool access is synchronous, so every operation runs on the blocking
/// thread pool.
#[derive(Clone)]
pub struct SqliteLoginStore {
    pool: DbPool,
}

impl SqliteLoginStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DbPool) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || f(&pool))
            .await
            .map_err(|e| Error::Database(format!("login store task failed: {e}")))?
    }
}

#[async_trait]
impl LoginStore for SqliteLoginStore {
    async fn load(&self, token: &str) -> Result<Option<LoginParams>> {
        let token = token.to_string();
        self.blocking(move |pool| {
            let conn = connection(pool)?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT params FROM logins WHERE token = ?1",
                    [&token],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
                .transpose()
        })
        .await
    }

    async fn store(&self, token: &str, params: &LoginParams) -> Result<()> {
        let token = token.to_string();
        let raw = serde_json::to_string(params)?;
        self.blocking(move |pool| {
            let conn = connection(pool)?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO logins (token, params, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(token) DO UPDATE SET params = excluded.params, updated_at = excluded.updated_at",
                [&token, &raw, &now],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        self.blocking(move |pool| {
            let conn = connection(pool)?;
            let affected = conn.execute("DELETE FROM logins WHERE token = ?1", [&token])?;
            Ok(affected > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init, init_memory};
    use crate::login::LoginGateway;
    use std::sync::Arc;

    #[tokio::test]
    async fn round_trip_through_gateway() {
        let store = Arc::new(SqliteLoginStore::new(init_memory().unwrap()));
        let gateway = LoginGateway::new(store);

        let params = LoginParams {
            email: "user@example.com".to_string(),
            device_type: "desktop".to_string(),
            ..LoginParams::default()
        };
        let mut login = gateway.create_login(params).await.unwrap();

        login.params_mut().is_valid_second_auth = true;
        login.save().await.unwrap();

        let reloaded = gateway.get_login(login.token()).await.unwrap().unwrap();
        assert_eq!(reloaded.params().email, "user@example.com");
        assert!(reloaded.params().is_valid_second_auth);

        reloaded.delete().await.unwrap();
        assert!(gateway.get_login(login.token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logins.db");

        let token = {
            let gateway = LoginGateway::new(Arc::new(SqliteLoginStore::new(init(&path).unwrap())));
            let login = gateway.create_login(LoginParams::default()).await.unwrap();
            login.token().to_string()
        };

        let gateway = LoginGateway::new(Arc::new(SqliteLoginStore::new(init(&path).unwrap())));
        assert!(gateway.get_login(&token).await.unwrap().is_some());
    }
}
