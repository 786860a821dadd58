// 🔐 Permission Evaluator - Role-based gating for registry operations
//
// Evaluation order matters:
//   1. no user         → denied
//   2. admin           → granted
//   3. empty set       → denied
//   4. otherwise       → granted iff the set holds the permission or "all"
//
// Per-person exceptions are not written as code. They live in a
// `PermissionPolicy` (role → permissions, CPF → roles) loaded from config.

use crate::masks::strip_non_digits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// PERMISSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    All,
    View,
    Create,
    Edit,
    Delete,
}

impl Permission {
    pub const ALL_VALUES: [Permission; 5] = [
        Permission::All,
        Permission::View,
        Permission::Create,
        Permission::Edit,
        Permission::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::All => "all",
            Permission::View => "view",
            Permission::Create => "create",
            Permission::Edit => "edit",
            Permission::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Permission> {
        Permission::ALL_VALUES
            .iter()
            .copied()
            .find(|p| p.as_str() == value)
    }

    /// Label shown next to the checkbox in the user form.
    pub fn label(&self) -> &'static str {
        match self {
            Permission::All => "Todas as permissões",
            Permission::View => "Visualizar",
            Permission::Create => "Incluir",
            Permission::Edit => "Alterar",
            Permission::Delete => "Excluir",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PERMISSION SET
// ============================================================================

/// The permission strings stored on a user record.
///
/// Stored as plain strings so records written by older clients (or with
/// unknown values) still load; [`PermissionSet::unknown`] reports the strays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<String>);

impl PermissionSet {
    pub fn new() -> Self {
        PermissionSet(Vec::new())
    }

    /// Default for newly created users.
    pub fn view_only() -> Self {
        PermissionSet(vec![Permission::View.as_str().to_string()])
    }

    pub fn from_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = PermissionSet::new();
        for v in values {
            set.insert(v.into());
        }
        set
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.iter().any(|p| p == permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    fn insert(&mut self, permission: String) {
        if !self.contains(&permission) {
            self.0.push(permission);
        }
    }

    /// Merge another set into this one (no duplicates).
    pub fn extend(&mut self, other: &PermissionSet) {
        for p in other.iter() {
            self.insert(p.to_string());
        }
    }

    /// Checkbox semantics of the user form:
    /// - checking "all" replaces everything with ["all"]
    /// - checking anything else drops "all" and adds the permission
    /// - unchecking removes the permission
    pub fn toggle(&mut self, permission: Permission, checked: bool) {
        let name = permission.as_str();
        match (permission, checked) {
            (Permission::All, true) => {
                self.0 = vec![name.to_string()];
            }
            (_, true) => {
                self.0.retain(|p| p != Permission::All.as_str());
                self.insert(name.to_string());
            }
            (_, false) => {
                self.0.retain(|p| p != name);
            }
        }
    }

    /// Entries that are not one of the known permission names.
    pub fn unknown(&self) -> Vec<&str> {
        self.iter().filter(|p| Permission::parse(p).is_none()).collect()
    }
}

// ============================================================================
// SESSION USER (read-only view consumed by the evaluator)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: String,
    /// Stripped CPF
    pub cpf: String,
    pub is_admin: bool,
    pub permissions: PermissionSet,
}

/// Core evaluation rule. Every registry operation goes through this.
pub fn has_permission(user: Option<&SessionUser>, permission: &str) -> bool {
    let Some(user) = user else {
        return false;
    };

    if user.is_admin {
        return true;
    }

    if user.permissions.is_empty() {
        return false;
    }

    user.permissions.contains(permission) || user.permissions.contains(Permission::All.as_str())
}

// ============================================================================
// PERMISSION POLICY (configuration data)
// ============================================================================

/// Role-to-permission mapping plus CPF-to-role assignments.
///
/// ```toml
/// [policy.roles]
/// auditor = ["view"]
/// clerk = ["view", "create", "edit"]
///
/// [policy.assignments]
/// "22251193847" = ["clerk"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub assignments: BTreeMap<String, Vec<String>>,
}

impl PermissionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: define a role
    pub fn with_role(mut self, role: impl Into<String>, permissions: &[Permission]) -> Self {
        self.roles.insert(
            role.into(),
            permissions.iter().map(|p| p.as_str().to_string()).collect(),
        );
        self
    }

    /// Builder: assign a role to a CPF (masked or stripped)
    pub fn with_assignment(mut self, cpf: &str, role: impl Into<String>) -> Self {
        self.assignments
            .entry(strip_non_digits(cpf))
            .or_default()
            .push(role.into());
        self
    }

    /// Roles granted to a CPF by configuration.
    pub fn roles_for(&self, cpf: &str) -> Vec<&str> {
        let key = strip_non_digits(cpf);
        self.assignments
            .iter()
            .find(|(k, _)| strip_non_digits(k) == key)
            .map(|(_, roles)| roles.iter().map(|r| r.as_str()).collect())
            .unwrap_or_default()
    }

    /// Stored permissions merged with every permission granted by the
    /// user's configured roles. Unknown role names grant nothing.
    pub fn effective(&self, user: &SessionUser) -> SessionUser {
        let mut merged = user.permissions.clone();
        for role in self.roles_for(&user.cpf) {
            if let Some(granted) = self.roles.get(role) {
                merged.extend(&PermissionSet::from_strings(granted.iter().cloned()));
            }
        }

        SessionUser {
            permissions: merged,
            ..user.clone()
        }
    }

    /// [`has_permission`] applied to the policy-expanded user.
    pub fn evaluate(&self, user: Option<&SessionUser>, permission: &str) -> bool {
        match user {
            Some(u) => has_permission(Some(&self.effective(u)), permission),
            None => false,
        }
    }

    /// Role names that map to permission strings outside the known set.
    pub fn invalid_entries(&self) -> Vec<String> {
        self.roles
            .iter()
            .flat_map(|(role, perms)| {
                perms
                    .iter()
                    .filter(|p| Permission::parse(p).is_none())
                    .map(move |p| format!("{}: {}", role, p))
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool, perms: &[&str]) -> SessionUser {
        SessionUser {
            name: "Maria".to_string(),
            cpf: "11144477735".to_string(),
            is_admin,
            permissions: PermissionSet::from_strings(perms.iter().copied()),
        }
    }

    #[test]
    fn test_absent_user_has_nothing() {
        assert!(!has_permission(None, "view"));
    }

    #[test]
    fn test_view_only_cannot_edit() {
        let u = user(false, &["view"]);
        assert!(has_permission(Some(&u), "view"));
        assert!(!has_permission(Some(&u), "edit"));
    }

    #[test]
    fn test_all_implies_everything() {
        let u = user(false, &["all"]);
        assert!(has_permission(Some(&u), "delete"));
        assert!(has_permission(Some(&u), "create"));
    }

    #[test]
    fn test_admin_overrides_empty_set() {
        let u = user(true, &[]);
        assert!(has_permission(Some(&u), "delete"));
    }

    #[test]
    fn test_empty_set_denies() {
        let u = user(false, &[]);
        assert!(!has_permission(Some(&u), "view"));
    }

    #[test]
    fn test_toggle_all_replaces_set() {
        let mut set = PermissionSet::from_strings(["view", "edit"]);
        set.toggle(Permission::All, true);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["all"]);
    }

    #[test]
    fn test_toggle_specific_drops_all() {
        let mut set = PermissionSet::from_strings(["all"]);
        set.toggle(Permission::Edit, true);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["edit"]);

        set.toggle(Permission::View, true);
        set.toggle(Permission::View, true);
        assert_eq!(set.len(), 2);

        set.toggle(Permission::Edit, false);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["view"]);
    }

    #[test]
    fn test_unknown_permissions_reported() {
        let set = PermissionSet::from_strings(["view", "superuser"]);
        assert_eq!(set.unknown(), vec!["superuser"]);
    }

    #[test]
    fn test_policy_grants_role_permissions() {
        let policy = PermissionPolicy::new()
            .with_role("clerk", &[Permission::View, Permission::Create, Permission::Edit])
            .with_assignment("222.511.938-47", "clerk");

        let mut clerk = user(false, &["view"]);
        clerk.cpf = "22251193847".to_string();

        assert!(!has_permission(Some(&clerk), "create"));
        assert!(policy.evaluate(Some(&clerk), "create"));
        assert!(policy.evaluate(Some(&clerk), "edit"));
        assert!(!policy.evaluate(Some(&clerk), "delete"));
    }

    #[test]
    fn test_policy_without_assignment_is_plain_rule() {
        let policy = PermissionPolicy::new().with_role("clerk", &[Permission::All]);
        let u = user(false, &["view"]);
        assert!(!policy.evaluate(Some(&u), "delete"));
        assert!(!policy.evaluate(None, "view"));
    }

    #[test]
    fn test_policy_invalid_entries() {
        let mut policy = PermissionPolicy::new();
        policy
            .roles
            .insert("weird".to_string(), vec!["view".to_string(), "fly".to_string()]);
        assert_eq!(policy.invalid_entries(), vec!["weird: fly".to_string()]);
    }
}
