// Contract Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod masks;          // Digit masks for CPF, CNPJ, phone, date, CEP
pub mod documents;      // CPF / CNPJ check digits, date rules
pub mod permissions;    // Permission evaluator + configurable policy
pub mod error;          // Registry error categories
pub mod schema;         // Form schemas
pub mod deduplication;  // Natural keys + duplicate detection
pub mod entities;       // Registry record types
pub mod db;             // SQLite store + audit events
pub mod session;        // Login, logout, password hashing
pub mod registry;       // CRUD pipeline
pub mod config;         // TOML configuration

// Re-export commonly used types
pub use config::{Config, ServerConfig};
pub use db::{
    Event,
    open_database, setup_database,
    insert_record, update_record, delete_record, get_record, list_records,
    find_by_natural_key, count_records, registry_counts, next_contract_sequence,
    insert_event, get_events_for_entity,
};
pub use deduplication::{
    NaturalKey, DuplicateMatch,
    is_duplicate, find_conflict, find_duplicates,
};
pub use documents::{validate_cpf, validate_cnpj, validate_date, parse_date, is_adult};
pub use entities::{
    Record, RecordMeta, RegistryKind,
    Entity, Municipality, LinkedEntity, CorrectionIndex, BiddingModality,
    ResponsibleParty, System, SystemModule, User, Contract, ContractStatus, Amendment,
    ContractEntity, ContractSystem, ContractDocument,
};
pub use error::{RegistryError, RegistryResult};
pub use masks::{cpf_mask, cnpj_mask, phone_mask, date_mask, cep_mask, MaskKind};
pub use permissions::{has_permission, Permission, PermissionPolicy, PermissionSet, SessionUser};
pub use registry::{bootstrap_admin, validate_json, Listing, RegistryService};
pub use schema::{Validate, ValidationError, ValidationResult};
pub use session::{hash_password, verify_password, Session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
