use std::sync::Arc;

use chrono::Duration;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{check_status, ApiError};
use crate::routes::{Navigator, Route};
use crate::service::PostService;
use crate::session::{AuthData, Session};
use crate::storage::SessionStore;

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    /// Seconds until the token expires.
    expires_in: i64,
    user_id: String,
}

/// Login, signup and logout against the user endpoints.
#[derive(Clone)]
pub struct AuthService {
    client: Client,
    user_url: Url,
    session: Session,
    store: SessionStore,
    posts: PostService,
    navigator: Arc<dyn Navigator>,
}

impl AuthService {
    pub fn new(
        config: &ApiConfig,
        client: Client,
        session: Session,
        store: SessionStore,
        posts: PostService,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client,
            user_url: config.user_url()?,
            session,
            store,
            posts,
            navigator,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Re-activates a persisted, still valid login.
    pub async fn restore(&self) -> bool {
        match self.store.get().await {
            Some(auth) => {
                info!(user_id = %auth.user_id, "restored session");
                self.session.set(auth);
                true
            }
            None => false,
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.user_url.join("signup")?)
            .json(&Credentials { email, password })
            .send()
            .await?;
        check_status(response).await?;
        info!("account created");
        self.navigator.navigate(Route::PostList);
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthData, ApiError> {
        let response = self
            .client
            .post(self.user_url.join("login")?)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let body = check_status(response).await?.json::<LoginResponse>().await?;
        let auth = AuthData::new(body.token, body.user_id, Duration::seconds(body.expires_in));
        self.store.save(&auth).await;
        self.session.set(auth.clone());
        info!(user_id = %auth.user_id, expires_at = %auth.expires_at, "logged in");
        self.navigator.navigate(Route::PostList);
        Ok(auth)
    }

    /// Ends the session and drops everything cached for it.
    pub async fn logout(&self) {
        self.session.clear();
        self.store.clear().await;
        self.posts.clear().await;
        info!("logged out");
        self.navigator.navigate(Route::PostList);
    }
}
