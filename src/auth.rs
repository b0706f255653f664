//! Authentication against the hosted backend.
//!
//! The session lives in a [`SessionHandle`] shared with the remote task store,
//! is persisted as `session.json` in the data dir, and is refreshed on start
//! when it is about to expire. Session changes are broadcast as [`AuthEvent`]s
//! to every subscriber.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BackendConfig;
use crate::error::{JoytaskError, Result};
use crate::models::UserId;

const REFRESH_MARGIN_SECS: i64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A change in who is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserId),
    SignedOut,
}

/// Identity source the reconciler follows.
pub trait AuthProvider {
    fn current_user(&self) -> Option<UserId>;
    fn sign_in(&self, email: &str, password: &str) -> Result<UserId>;
    fn sign_out(&self) -> Result<()>;
    /// Receives every event emitted after this call.
    fn subscribe(&self) -> Receiver<AuthEvent>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

impl Session {
    fn is_expiring(&self) -> bool {
        self.expires_at <= Utc::now().timestamp() + REFRESH_MARGIN_SECS
    }
}

/// Shared, swappable view of the current session.
#[derive(Clone, Default)]
pub struct SessionHandle(Arc<RwLock<Option<Session>>>);

impl SessionHandle {
    pub fn get(&self) -> Option<Session> {
        self.0.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set(&self, session: Option<Session>) {
        *self.0.write().unwrap_or_else(|p| p.into_inner()) = session;
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct AuthErrorResponse {
    error_description: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now().timestamp() + token.expires_in,
            user_id: token.user.id,
            email: token.user.email,
        }
    }
}

/// Email/password auth against the hosted auth endpoint.
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    anon_key: String,
    session_path: PathBuf,
    session: SessionHandle,
    subscribers: Mutex<Vec<Sender<AuthEvent>>>,
}

impl SupabaseAuth {
    /// Restores a persisted session, refreshing it if it is about to expire.
    /// A session that cannot be refreshed is discarded.
    pub fn new(backend: &BackendConfig, session_path: &Path) -> Result<SupabaseAuth> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let auth = SupabaseAuth {
            client,
            base_url: backend.base_url().to_string(),
            anon_key: backend.anon_key.clone(),
            session_path: session_path.to_path_buf(),
            session: SessionHandle::default(),
            subscribers: Mutex::new(Vec::new()),
        };
        auth.restore();
        Ok(auth)
    }

    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    fn restore(&self) {
        let Some(stored) = load_session(&self.session_path) else {
            return;
        };
        if !stored.is_expiring() {
            self.session.set(Some(stored));
            return;
        }
        let refreshed = self.refresh(&stored.refresh_token);
        self.settle_refresh(stored, refreshed);
    }

    /// Only a rejected refresh token ends the session. Any other failure
    /// keeps the stored session for this run.
    fn settle_refresh(&self, stored: Session, refreshed: Result<Session>) {
        match refreshed {
            Ok(fresh) => {
                if let Err(e) = save_session(&self.session_path, &fresh) {
                    warn!(error = %e, "failed to persist refreshed session");
                }
                self.session.set(Some(fresh));
            }
            Err(JoytaskError::Auth(reason)) => {
                warn!(%reason, "refresh token rejected, continuing signed out");
                if let Err(e) = fs::remove_file(&self.session_path) {
                    warn!(path = %self.session_path.display(), error = %e, "could not remove session file");
                }
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, keeping the stored session");
                self.session.set(Some(stored));
            }
        }
    }

    fn token_url(&self, grant_type: &str) -> String {
        format!("{}/auth/v1/token?grant_type={grant_type}", self.base_url)
    }

    fn request_token(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let resp = self
            .client
            .post(self.token_url(grant_type))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp
                .json::<AuthErrorResponse>()
                .ok()
                .and_then(|e| e.error_description.or(e.msg).or(e.error))
                .unwrap_or_else(|| format!("HTTP {status}"));
            if status.is_server_error() {
                return Err(JoytaskError::Remote(format!("auth server error: {detail}")));
            }
            return Err(JoytaskError::Auth(detail));
        }
        let token: TokenResponse = resp.json()?;
        Ok(token.into())
    }

    fn refresh(&self, refresh_token: &str) -> Result<Session> {
        self.request_token(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
    }

    fn emit(&self, event: AuthEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl AuthProvider for SupabaseAuth {
    fn current_user(&self) -> Option<UserId> {
        self.session.get().map(|s| s.user_id)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<UserId> {
        let session = self.request_token(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )?;
        save_session(&self.session_path, &session)?;
        let user = session.user_id.clone();
        self.session.set(Some(session));
        info!(user = %user, "signed in");
        self.emit(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> Result<()> {
        if let Some(token) = self.session.access_token() {
            let revoke = self
                .client
                .post(format!("{}/auth/v1/logout", self.base_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(token)
                .send();
            if let Err(e) = revoke {
                warn!(error = %e, "remote sign-out failed, dropping local session anyway");
            }
        }
        self.session.set(None);
        if self.session_path.exists() {
            fs::remove_file(&self.session_path)?;
        }
        info!("signed out");
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AuthEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(tx);
        rx
    }
}

fn load_session(path: &Path) -> Option<Session> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
            None
        }
    }
}

fn save_session(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(session)?)?;
    Ok(())
}
