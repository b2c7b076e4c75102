//! Authentication collaborator and the admin-only session gate.

use std::sync::RwLock;

use kiosk_core::{KioskError, KioskResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub is_admin: bool,
}

/// Session provider. Only admins may hold a session.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    fn current_user(&self) -> Option<User>;

    /// Fails with `Unauthorized` on bad credentials or a non-admin account; the
    /// session is signed out in both cases.
    async fn sign_in(&self, email: &str, password: &str) -> KioskResult<User>;

    async fn sign_out(&self) -> KioskResult<()>;

    /// Session changes; the current value is the signed-in user, if any.
    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

/// Fail unless `session` holds an admin.
pub fn require_admin(session: &watch::Receiver<Option<User>>) -> KioskResult<User> {
    match session.borrow().as_ref() {
        Some(u) if u.is_admin => Ok(u.clone()),
        Some(_) => Err(KioskError::Unauthorized("admin access required".into())),
        None => Err(KioskError::Unauthorized("not signed in".into())),
    }
}

struct Account {
    password: String,
    user: User,
}

/// In-process account registry.
pub struct MemoryAuth {
    accounts: RwLock<FxHashMap<String, Account>>,
    session: watch::Sender<Option<User>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        let (session, _) = watch::channel(None);
        Self { accounts: RwLock::new(FxHashMap::default()), session }
    }
}

impl MemoryAuth {
    pub fn new() -> Self { Self::default() }

    /// Registry holding the admin configured via `KIOSK_ADMIN_EMAIL`/`KIOSK_ADMIN_PASSWORD`.
    pub fn from_settings(settings: &Settings) -> Self {
        let auth = Self::new();
        match (&settings.admin_email, &settings.admin_password) {
            (Some(email), Some(password)) => auth.add_account(email, password, true),
            _ => warn!("auth: no admin account configured"),
        }
        auth
    }

    pub fn add_account(&self, email: &str, password: &str, is_admin: bool) {
        let key = email.trim().to_lowercase();
        let user = User { uid: uuid::Uuid::new_v4().simple().to_string(), email: key.clone(), is_admin };
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(key, Account { password: password.to_string(), user });
        }
    }

    fn verify(&self, email: &str, password: &str) -> KioskResult<User> {
        let accounts = self.accounts.read().map_err(|_| KioskError::Internal("auth registry poisoned".into()))?;
        match accounts.get(&email.trim().to_lowercase()) {
            Some(acc) if acc.password == password => Ok(acc.user.clone()),
            _ => Err(KioskError::Unauthorized("invalid email or password".into())),
        }
    }
}

#[async_trait::async_trait]
impl AuthService for MemoryAuth {
    fn current_user(&self) -> Option<User> { self.session.borrow().clone() }

    async fn sign_in(&self, email: &str, password: &str) -> KioskResult<User> {
        let res = self.verify(email, password).and_then(|u| {
            if u.is_admin {
                Ok(u)
            } else {
                Err(KioskError::Unauthorized("admin access required".into()))
            }
        });
        match &res {
            Ok(u) => {
                self.session.send_replace(Some(u.clone()));
                info!(email = %u.email, "auth: signed in");
            }
            Err(e) => {
                self.session.send_replace(None);
                warn!(email = %email, error = %e, "auth: sign-in refused");
            }
        }
        res
    }

    async fn sign_out(&self) -> KioskResult<()> {
        if self.session.send_replace(None).is_some() {
            info!("auth: signed out");
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> { self.session.subscribe() }
}
