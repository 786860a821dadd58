// Registry Records
//
// Every registry type carries:
// - a surrogate identity (UUID) assigned on first insert
// - a natural key used for application-level uniqueness
// - the fields its form collects
//
// The `Record` trait is what the store, the duplicate checker and the
// registry service are generic over.

pub mod contract;
pub mod entity;
pub mod index;
pub mod modality;
pub mod municipality;
pub mod responsible;
pub mod system;
pub mod user;

pub use contract::{
    Amendment, Contract, ContractDocument, ContractEntity, ContractStatus, ContractSystem,
    DOCUMENT_CONTENT_TYPES,
};
pub use entity::Entity;
pub use index::{month_name, CorrectionIndex};
pub use modality::BiddingModality;
pub use municipality::{LinkedEntity, Municipality};
pub use responsible::ResponsibleParty;
pub use system::{System, SystemModule};
pub use user::User;

use crate::deduplication::NaturalKey;
use crate::schema::Validate;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// REGISTRY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryKind {
    Entity,
    Municipality,
    CorrectionIndex,
    BiddingModality,
    ResponsibleParty,
    System,
    User,
    Contract,
}

impl RegistryKind {
    pub const ALL: [RegistryKind; 8] = [
        RegistryKind::Entity,
        RegistryKind::Municipality,
        RegistryKind::CorrectionIndex,
        RegistryKind::BiddingModality,
        RegistryKind::ResponsibleParty,
        RegistryKind::System,
        RegistryKind::User,
        RegistryKind::Contract,
    ];

    /// SQLite table backing this registry
    pub fn table_name(&self) -> &'static str {
        match self {
            RegistryKind::Entity => "entities",
            RegistryKind::Municipality => "municipalities",
            RegistryKind::CorrectionIndex => "correction_indices",
            RegistryKind::BiddingModality => "bidding_modalities",
            RegistryKind::ResponsibleParty => "responsible_parties",
            RegistryKind::System => "systems",
            RegistryKind::User => "users",
            RegistryKind::Contract => "contracts",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Entity => "Entity",
            RegistryKind::Municipality => "Municipality",
            RegistryKind::CorrectionIndex => "CorrectionIndex",
            RegistryKind::BiddingModality => "BiddingModality",
            RegistryKind::ResponsibleParty => "ResponsibleParty",
            RegistryKind::System => "System",
            RegistryKind::User => "User",
            RegistryKind::Contract => "Contract",
        }
    }

    /// Accepts the table name, the type name, or a short alias.
    pub fn parse(name: &str) -> Option<RegistryKind> {
        let lower = name.to_lowercase();
        RegistryKind::ALL.iter().copied().find(|k| {
            k.table_name() == lower
                || k.as_str().to_lowercase() == lower
                || k.alias() == lower
        })
    }

    fn alias(&self) -> &'static str {
        match self {
            RegistryKind::Entity => "entity",
            RegistryKind::Municipality => "municipality",
            RegistryKind::CorrectionIndex => "index",
            RegistryKind::BiddingModality => "modality",
            RegistryKind::ResponsibleParty => "responsible",
            RegistryKind::System => "system",
            RegistryKind::User => "user",
            RegistryKind::Contract => "contract",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RECORD METADATA
// ============================================================================

/// Identity and bookkeeping shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Surrogate identity, empty until the record is first stored
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn with_id(id: impl Into<String>) -> Self {
        RecordMeta {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Assign identity and creation time if missing.
    pub fn init(&mut self) {
        let now = Utc::now();
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

// ============================================================================
// RECORD TRAIT
// ============================================================================

pub trait Record: Validate + Serialize + DeserializeOwned + Clone + Send + 'static {
    const KIND: RegistryKind;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn natural_key(&self) -> NaturalKey;

    /// Values matched (case-insensitively) by registry search.
    fn search_fields(&self) -> Vec<String>;

    /// Column headers for the printed listing.
    fn columns() -> &'static [&'static str];

    /// One printed row, aligned with [`Record::columns`].
    fn row(&self) -> Vec<String>;

    /// Records shown with a running display number (contracts) take a fresh
    /// one from the store on every create.
    fn needs_sequence(&self) -> bool {
        false
    }

    fn set_sequence(&mut self, _sequence: String) {}

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.search_fields()
            .iter()
            .any(|f| f.to_lowercase().contains(&term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_kind_parse() {
        assert_eq!(RegistryKind::parse("entities"), Some(RegistryKind::Entity));
        assert_eq!(RegistryKind::parse("Contract"), Some(RegistryKind::Contract));
        assert_eq!(RegistryKind::parse("index"), Some(RegistryKind::CorrectionIndex));
        assert_eq!(RegistryKind::parse("banks"), None);
    }

    #[test]
    fn test_table_names_unique() {
        let mut names: Vec<&str> = RegistryKind::ALL.iter().map(|k| k.table_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RegistryKind::ALL.len());
    }

    #[test]
    fn test_meta_init_keeps_existing_identity() {
        let mut meta = RecordMeta::with_id("fixed");
        meta.init();
        assert_eq!(meta.id, "fixed");
        assert!(meta.created_at.is_some());

        let mut fresh = RecordMeta::default();
        fresh.init();
        assert_eq!(fresh.id.len(), 36);
    }
}
