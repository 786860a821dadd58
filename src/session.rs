// 🔐 Session - Who is logged in, and how they got there
//
// A session is an explicit value owned by the caller (CLI invocation, HTTP
// token entry). Nothing here is global: two sessions can coexist against the
// same connection.

use crate::db::{self, Event};
use crate::deduplication::NaturalKey;
use crate::entities::{Record, User};
use crate::error::{RegistryError, RegistryResult};
use crate::masks::strip_non_digits;
use crate::permissions::{Permission, PermissionPolicy, SessionUser};
use crate::schema::validate_password_change;
use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

// ============================================================================
// PASSWORDS
// ============================================================================

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> RegistryResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a password against a PHC-format hash string.
/// A malformed or empty stored hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Look a user up by CPF (masked or stripped).
pub fn find_user_by_cpf(conn: &Connection, cpf: &str) -> RegistryResult<Option<User>> {
    let key = NaturalKey::cpf(cpf);
    let mut users: Vec<User> = db::find_by_natural_key(conn, &key, None)?;
    Ok(if users.is_empty() {
        None
    } else {
        Some(users.swap_remove(0))
    })
}

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<SessionUser>,
}

impl Session {
    /// A logged-out session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session already holding a user (tests, trusted callers).
    pub fn for_user(user: SessionUser) -> Self {
        Session { user: Some(user) }
    }

    /// Authenticate by CPF and password.
    ///
    /// The error never says which of the two was wrong.
    pub fn login(conn: &Connection, cpf: &str, password: &str) -> RegistryResult<Session> {
        let digits = strip_non_digits(cpf);

        let Some(user) = find_user_by_cpf(conn, &digits)? else {
            warn!(cpf = %digits, "login rejected: unknown CPF");
            return Err(RegistryError::Authentication);
        };

        if !verify_password(password, &user.password_hash) {
            warn!(cpf = %digits, "login rejected: wrong password");
            return Err(RegistryError::Authentication);
        }

        db::insert_event(
            conn,
            &Event::new(
                "login",
                User::KIND.table_name(),
                user.id(),
                serde_json::json!({ "name": user.name }),
                &digits,
            ),
        )?;
        info!(cpf = %digits, admin = user.is_admin, "user logged in");

        Ok(Session::for_user(user.to_session_user()))
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            info!(cpf = %user.cpf, "user logged out");
        }
    }

    pub fn current_user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Audit actor: the user's CPF, or "anonymous".
    pub fn actor(&self) -> &str {
        self.user.as_ref().map(|u| u.cpf.as_str()).unwrap_or("anonymous")
    }

    pub fn has_permission(&self, policy: &PermissionPolicy, permission: Permission) -> bool {
        policy.evaluate(self.current_user(), permission.as_str())
    }

    /// Gate an operation on a permission.
    pub fn require(&self, policy: &PermissionPolicy, permission: Permission) -> RegistryResult<()> {
        if !self.is_authenticated() {
            return Err(RegistryError::NotAuthenticated);
        }
        if !self.has_permission(policy, permission) {
            debug!(actor = self.actor(), permission = %permission, "permission denied");
            return Err(RegistryError::Forbidden {
                permission: permission.to_string(),
            });
        }
        Ok(())
    }

    /// Change the logged-in user's own password.
    pub fn change_password(
        &self,
        conn: &Connection,
        current: &str,
        new: &str,
        confirmation: &str,
    ) -> RegistryResult<()> {
        let Some(session_user) = self.current_user() else {
            return Err(RegistryError::NotAuthenticated);
        };

        validate_password_change(current, new, confirmation).map_err(RegistryError::Validation)?;

        let Some(mut user) = find_user_by_cpf(conn, &session_user.cpf)? else {
            return Err(RegistryError::NotFound {
                kind: User::KIND.to_string(),
                id: session_user.cpf.clone(),
            });
        };

        if !verify_password(current, &user.password_hash) {
            warn!(cpf = %session_user.cpf, "password change rejected: wrong current password");
            return Err(RegistryError::Authentication);
        }

        user.password_hash = hash_password(new)?;
        user.meta.touch();
        db::update_record(conn, &user)?;
        db::insert_event(
            conn,
            &Event::new(
                "password_changed",
                User::KIND.table_name(),
                user.id(),
                serde_json::json!({}),
                self.actor(),
            ),
        )?;
        info!(cpf = %session_user.cpf, "password changed");

        Ok(())
    }
}
