use std::sync::Arc;

use ecotrack_db::Database;
use ecotrack_gateway::dispatcher::Dispatcher;
use uuid::Uuid;

use ecotrack_types::api::Claims;

use crate::error::ApiError;
use crate::mail::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub mailer: Mailer,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    /// Run a blocking DB call off the async runtime.
    pub async fn db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    /// Whether the caller is an admin right now. Reads the database so that a
    /// demotion applies before the caller's token expires.
    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let user = self.db(move |db| db.get_user(user_id)).await?;
        Ok(user.is_some_and(|u| u.is_admin))
    }

    /// Allow the request if the caller is `owner_id` or an admin.
    pub async fn ensure_self_or_admin(&self, claims: &Claims, owner_id: Uuid) -> Result<(), ApiError> {
        if claims.sub == owner_id || self.is_admin(claims.sub).await? {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}
