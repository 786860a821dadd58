// 🧑‍💼 User - Application accounts, identified by CPF
//
// Passwords are kept as Argon2id PHC strings; the plaintext never reaches a
// record. See `session::hash_password`.

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::NaturalKey;
use crate::masks::{format_cpf, strip_non_digits};
use crate::permissions::{PermissionSet, SessionUser};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub name: String,

    /// Stored stripped
    pub cpf: String,

    /// DD/MM/YYYY
    pub date_of_birth: String,

    #[serde(default)]
    pub password_hash: String,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default = "PermissionSet::view_only")]
    pub permissions: PermissionSet,
}

impl User {
    /// New non-admin user with the default ["view"] permission.
    pub fn new(name: &str, cpf: &str, date_of_birth: &str) -> Self {
        User {
            meta: RecordMeta::default(),
            name: name.to_string(),
            cpf: strip_non_digits(cpf),
            date_of_birth: date_of_birth.to_string(),
            password_hash: String::new(),
            is_admin: false,
            permissions: PermissionSet::view_only(),
        }
    }

    /// Builder: admin flag
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Builder: permission set
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    /// Read-only view held by a session.
    pub fn to_session_user(&self) -> SessionUser {
        SessionUser {
            name: self.name.clone(),
            cpf: strip_non_digits(&self.cpf),
            is_admin: self.is_admin,
            permissions: self.permissions.clone(),
        }
    }
}

impl Record for User {
    const KIND: RegistryKind = RegistryKind::User;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::cpf(&self.cpf)
    }

    fn search_fields(&self) -> Vec<String> {
        vec![self.name.clone(), strip_non_digits(&self.cpf)]
    }

    fn columns() -> &'static [&'static str] {
        &["Nome", "CPF", "Nascimento", "Administrador", "Permissões"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format_cpf(&self.cpf),
            self.date_of_birth.clone(),
            if self.is_admin { "Sim" } else { "Não" }.to_string(),
            self.permissions.iter().collect::<Vec<_>>().join(", "),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let u = User::new("Maria", "111.444.777-35", "15/03/1990");
        assert_eq!(u.cpf, "11144477735");
        assert!(!u.is_admin);
        assert!(u.permissions.contains("view"));
        assert_eq!(u.permissions.len(), 1);
    }

    #[test]
    fn test_row_never_contains_password() {
        let mut u = User::new("Maria", "11144477735", "15/03/1990");
        u.password_hash = "$argon2id$secret".to_string();
        assert!(u.row().iter().all(|c| !c.contains("argon2")));
    }

    #[test]
    fn test_missing_permissions_deserialize_as_view() {
        let json = r#"{"id":"1","name":"Ana","cpf":"11144477735","date_of_birth":"01/01/1990"}"#;
        let u: User = serde_json::from_str(json).unwrap();
        assert!(u.permissions.contains("view"));
        assert!(u.password_hash.is_empty());
    }
}
