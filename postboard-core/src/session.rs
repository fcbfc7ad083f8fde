use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::routes::{Guard, Route};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

impl AuthData {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + expires_in,
            user_id: user_id.into(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Current authentication state, observable by views.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<watch::Sender<Option<AuthData>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Session {
    pub fn new(initial: Option<AuthData>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { state: Arc::new(tx) }
    }

    /// Active, unexpired auth data.
    pub fn current(&self) -> Option<AuthData> {
        let state = self.state.borrow();
        (*state).as_ref().filter(|auth| !auth.is_expired()).cloned()
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|auth| auth.token)
    }

    pub fn user_id(&self) -> Option<String> {
        self.current().map(|auth| auth.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    pub fn set(&self, auth: AuthData) {
        self.state.send_replace(Some(auth));
    }

    pub fn clear(&self) {
        self.state.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthData>> {
        self.state.subscribe()
    }
}

impl Guard for Session {
    fn can_activate(&self, route: &Route) -> bool {
        !route.requires_auth() || self.is_authenticated()
    }
}
