//! Username/password accounts.
//!
//! Credentials live in a local table and in the remote auth table. Login
//! tries the remote table first so an account created on one device works
//! on another, then falls back to the local table when the remote lookup
//! misses or is unavailable.
//!
//! Passwords are compared through [`simple_hash`], a 32-bit string hash that
//! is not a password hash in any cryptographic sense. Every stored hash,
//! local or remote, uses it, so changing it would lock out existing users.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::dates::now_iso;
use crate::remote::RemoteMirror;
use crate::remote::outbox::PushRequest;
use crate::storage::{LocalStore, generate_record_id, keys};
use crate::types::{AuthUser, LoginCredentials, SignupData, StoredUser, User};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Email already exists")]
    EmailTaken,
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("New password must be at least 6 characters")]
    NewPasswordTooShort,
    #[error("User not found")]
    UserNotFound,
    #[error("Current password is incorrect")]
    WrongPassword,
    #[error("Admin privileges required")]
    NotAdmin,
}

/// Accounts called `admin`, or whose display name mentions admin, get
/// admin rights.
fn named_admin(username: &str, name: &str) -> bool {
    username.trim().eq_ignore_ascii_case("admin") || name.to_lowercase().contains("admin")
}

/// `hash = hash * 31 + unit` over the UTF-16 code units, wrapping at 32
/// bits, printed as signed base 36.
pub fn simple_hash(password: &str) -> String {
    let hash = password.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    });
    to_base36(hash)
}

fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = i64::from(value).unsigned_abs();
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    if value < 0 {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// An 8 character password drawn from ASCII letters and digits.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

pub struct AuthService {
    store: Arc<LocalStore>,
    mirror: Arc<RemoteMirror>,
}

impl AuthService {
    pub fn new(store: Arc<LocalStore>, mirror: Arc<RemoteMirror>) -> Self {
        Self { store, mirror }
    }

    /// The local credential table.
    pub fn stored_users(&self) -> Vec<StoredUser> {
        self.store.load_collection(keys::AUTH_USERS)
    }

    fn save_stored_users(&self, users: &[StoredUser]) {
        if let Err(err) = self.store.write_json(keys::AUTH_USERS, users) {
            error!(error = %err, "error saving auth users");
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        match self.store.read_json::<AuthUser>(keys::CURRENT_USER) {
            Ok(user) => user,
            Err(err) => {
                error!(error = %err, "error loading current user");
                None
            }
        }
    }

    /// The signed-in user, if they hold admin rights.
    pub fn require_admin(&self) -> Result<AuthUser, AuthError> {
        let user = self.current_user().ok_or(AuthError::NotLoggedIn)?;
        if user.is_admin || named_admin(&user.username, &user.name) {
            Ok(user)
        } else {
            warn!(username = %user.username, "admin action refused");
            Err(AuthError::NotAdmin)
        }
    }

    fn set_current_user(&self, user: Option<&AuthUser>) {
        let result = match user {
            Some(user) => self.store.write_json(keys::CURRENT_USER, user),
            None => self.store.remove_key(keys::CURRENT_USER),
        };
        if let Err(err) = result {
            error!(error = %err, "error setting current user");
        }
    }

    /// Makes the person visible in the standup views and queues a push of
    /// their app-user record.
    fn publish_app_user(&self, user: &AuthUser) {
        let app_user = User::from(user);
        self.store.ensure_user(app_user.clone());
        if let Some(outbox) = self.store.outbox() {
            outbox.enqueue(PushRequest::Users(vec![app_user]));
        }
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthUser, AuthError> {
        let username = credentials.username.trim();
        if username.is_empty() || credentials.password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let password_hash = simple_hash(&credentials.password);

        let remote = self
            .mirror
            .get_auth_user_by_username(&username.to_lowercase())
            .await
            .filter(|u| u.password_hash == password_hash);
        let found = match remote {
            Some(user) => Some(user),
            None => self.stored_users().into_iter().find(|u| {
                u.user.username.to_lowercase() == username.to_lowercase()
                    && u.password_hash == password_hash
            }),
        };
        let Some(mut stored) = found else {
            return Err(AuthError::InvalidCredentials);
        };

        stored.user.last_login_at = now_iso();
        let mut local = self.stored_users();
        if let Some(existing) = local.iter_mut().find(|u| u.user.id == stored.user.id) {
            *existing = stored.clone();
            self.save_stored_users(&local);
        }

        self.set_current_user(Some(&stored.user));
        self.publish_app_user(&stored.user);
        self.mirror.upsert_auth_user(&stored).await;

        info!(username = %stored.user.username, "logged in");
        Ok(stored.user)
    }

    /// Creates an account and signs it in. Nothing is written unless every
    /// check passes.
    pub async fn signup(&self, data: SignupData) -> Result<AuthUser, AuthError> {
        let user = self.register(data).await?;
        self.set_current_user(Some(&user));
        Ok(user)
    }

    /// Creates an account without touching the current session.
    pub async fn register(&self, data: SignupData) -> Result<AuthUser, AuthError> {
        let SignupData {
            username,
            password,
            name,
            email,
            team_id,
        } = data;

        if username.trim().is_empty()
            || password.trim().is_empty()
            || name.trim().is_empty()
            || team_id.is_empty()
        {
            return Err(AuthError::MissingFields);
        }
        if utf16_len(&password) < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }

        let mut users = self.stored_users();
        if users
            .iter()
            .any(|u| u.user.username.to_lowercase() == username.to_lowercase())
        {
            return Err(AuthError::UsernameTaken);
        }
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        if let Some(email) = &email {
            let taken = users.iter().any(|u| {
                u.user
                    .email
                    .as_deref()
                    .is_some_and(|existing| existing.to_lowercase() == email.to_lowercase())
            });
            if taken {
                return Err(AuthError::EmailTaken);
            }
        }

        let is_admin = users.is_empty() || named_admin(&username, &name);
        let now = now_iso();
        let stored = StoredUser {
            user: AuthUser {
                id: generate_record_id("user"),
                username: username.trim().to_string(),
                email,
                name: name.trim().to_string(),
                team_id,
                created_at: now.clone(),
                last_login_at: now,
                is_admin,
            },
            password_hash: simple_hash(&password),
        };

        users.push(stored.clone());
        self.save_stored_users(&users);
        self.publish_app_user(&stored.user);
        self.mirror.upsert_auth_user(&stored).await;

        info!(username = %stored.user.username, is_admin, "account created");
        Ok(stored.user)
    }

    pub fn logout(&self) {
        self.set_current_user(None);
    }

    /// Also refreshes the remote auth record, so the new password works on
    /// other devices.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
        let me = self.current_user().ok_or(AuthError::NotLoggedIn)?;
        if utf16_len(new) < MIN_PASSWORD_LEN {
            return Err(AuthError::NewPasswordTooShort);
        }

        let mut users = self.stored_users();
        let user = users
            .iter_mut()
            .find(|u| u.user.id == me.id)
            .ok_or(AuthError::UserNotFound)?;
        if user.password_hash != simple_hash(current) {
            return Err(AuthError::WrongPassword);
        }
        user.password_hash = simple_hash(new);
        let updated = user.clone();

        self.save_stored_users(&users);
        self.mirror.upsert_auth_user(&updated).await;
        Ok(())
    }

    /// Removes the signed-in account and signs out. Standup entries are kept.
    pub fn delete_account(&self) -> Result<(), AuthError> {
        let me = self.current_user().ok_or(AuthError::NotLoggedIn)?;
        let users: Vec<_> = self
            .stored_users()
            .into_iter()
            .filter(|u| u.user.id != me.id)
            .collect();
        self.save_stored_users(&users);
        self.logout();
        Ok(())
    }

    /// Removes an account and pushes the remaining people as app users.
    pub fn delete_user(&self, user_id: &str) {
        let users: Vec<_> = self
            .stored_users()
            .into_iter()
            .filter(|u| u.user.id != user_id)
            .collect();
        self.save_stored_users(&users);
        if let Some(outbox) = self.store.outbox() {
            let remaining = users.iter().map(|u| User::from(&u.user)).collect();
            outbox.enqueue(PushRequest::Users(remaining));
        }
    }

    /// Every account, without password hashes.
    pub fn all_users(&self) -> Vec<AuthUser> {
        self.stored_users().into_iter().map(|u| u.user).collect()
    }

    /// Forgets every local account and the session.
    pub fn clear_all_data(&self) {
        for key in [keys::AUTH_USERS, keys::CURRENT_USER] {
            if let Err(err) = self.store.remove_key(key) {
                error!(key, error = %err, "error clearing auth data");
            }
        }
    }
}
