// Registry error categories
//
// Format failures and natural-key conflicts are separate variants: a
// conflict can only be detected by looking at stored records, while a
// format failure is a property of the candidate alone.

use crate::schema::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error("{kind} already registered with key {key}")]
    Duplicate { kind: String, key: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("permission denied: {permission}")]
    Forbidden { permission: String },

    #[error("invalid CPF or password")]
    Authentication,

    #[error("not logged in")]
    NotAuthenticated,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Store(err.into())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Store(err.into())
    }
}

impl RegistryError {
    /// Machine-readable category, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "VALIDATION_ERROR",
            RegistryError::Duplicate { .. } => "DUPLICATE",
            RegistryError::NotFound { .. } => "NOT_FOUND",
            RegistryError::Forbidden { .. } => "FORBIDDEN",
            RegistryError::Authentication => "AUTHENTICATION_FAILED",
            RegistryError::NotAuthenticated => "NOT_AUTHENTICATED",
            RegistryError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RegistryError::Duplicate { .. })
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_for_conflict_and_validation() {
        let validation = RegistryError::Validation(vec![ValidationError {
            field: "cnpj".to_string(),
            message: "CNPJ inválido".to_string(),
            context: "Entity".to_string(),
        }]);
        let duplicate = RegistryError::Duplicate {
            kind: "Entity".to_string(),
            key: "11222333000181".to_string(),
        };

        assert_eq!(validation.code(), "VALIDATION_ERROR");
        assert_eq!(duplicate.code(), "DUPLICATE");
        assert!(duplicate.is_duplicate());
        assert!(!validation.is_duplicate());
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = RegistryError::Validation(vec![
            ValidationError {
                field: "name".to_string(),
                message: "too short".to_string(),
                context: "System".to_string(),
            },
            ValidationError {
                field: "acronym".to_string(),
                message: "too short".to_string(),
                context: "System".to_string(),
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("[System] name: too short"));
        assert!(msg.contains("[System] acronym: too short"));
    }
}
