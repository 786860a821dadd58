// 🔍 Duplicate-Key Checker - Natural-key uniqueness per registry
//
// The store does not enforce uniqueness, so every insert and update asks
// this module first. Keys are normalized before comparison:
//   - CPF / CNPJ: digits only
//   - names, descriptions, acronyms: case-insensitive
//   - IBGE code: exact (after trimming)

use crate::entities::Record;
use crate::masks::strip_non_digits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// NATURAL KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NaturalKey {
    /// Stripped CNPJ (entities)
    Cnpj(String),

    /// IBGE municipality code
    IbgeCode(String),

    /// Correction index: lowercased name + month + year
    Index { name: String, month: u32, year: i32 },

    /// Lowercased description (bidding modalities)
    Description(String),

    /// Stripped CPF (responsible parties, users)
    Cpf(String),

    /// Lowercased acronym (systems)
    Acronym(String),

    /// Contract number + year
    Contract { number: String, year: String },
}

impl NaturalKey {
    pub fn cnpj(raw: &str) -> Self {
        NaturalKey::Cnpj(strip_non_digits(raw))
    }

    pub fn cpf(raw: &str) -> Self {
        NaturalKey::Cpf(strip_non_digits(raw))
    }

    pub fn ibge(raw: &str) -> Self {
        NaturalKey::IbgeCode(raw.trim().to_string())
    }

    pub fn index(name: &str, month: u32, year: i32) -> Self {
        NaturalKey::Index {
            name: name.trim().to_lowercase(),
            month,
            year,
        }
    }

    pub fn description(raw: &str) -> Self {
        NaturalKey::Description(raw.trim().to_lowercase())
    }

    pub fn acronym(raw: &str) -> Self {
        NaturalKey::Acronym(raw.trim().to_lowercase())
    }

    pub fn contract(number: &str, year: &str) -> Self {
        NaturalKey::Contract {
            number: number.trim().to_lowercase(),
            year: year.trim().to_string(),
        }
    }

    /// Flat string form, stored alongside each row for lookups.
    pub fn storage_key(&self) -> String {
        match self {
            NaturalKey::Cnpj(v)
            | NaturalKey::IbgeCode(v)
            | NaturalKey::Description(v)
            | NaturalKey::Cpf(v)
            | NaturalKey::Acronym(v) => v.clone(),
            NaturalKey::Index { name, month, year } => format!("{}|{:02}|{}", name, month, year),
            NaturalKey::Contract { number, year } => format!("{}|{}", number, year),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Cnpj(v) => write!(f, "CNPJ {}", v),
            NaturalKey::IbgeCode(v) => write!(f, "IBGE {}", v),
            NaturalKey::Index { name, month, year } => {
                write!(f, "{} {:02}/{}", name, month, year)
            }
            NaturalKey::Description(v) => write!(f, "{}", v),
            NaturalKey::Cpf(v) => write!(f, "CPF {}", v),
            NaturalKey::Acronym(v) => write!(f, "{}", v.to_uppercase()),
            NaturalKey::Contract { number, year } => write!(f, "{}/{}", number, year),
        }
    }
}

// ============================================================================
// CHECKS
// ============================================================================

/// True when some record other than `exclude_id` already holds the
/// candidate's natural key.
///
/// In edit mode pass the edited record's id so it never conflicts with
/// itself.
pub fn is_duplicate<T: Record>(candidate: &T, existing: &[T], exclude_id: Option<&str>) -> bool {
    find_conflict(candidate, existing, exclude_id).is_some()
}

/// The first record that conflicts with the candidate, if any.
pub fn find_conflict<'a, T: Record>(
    candidate: &T,
    existing: &'a [T],
    exclude_id: Option<&str>,
) -> Option<&'a T> {
    let key = candidate.natural_key();
    existing
        .iter()
        .filter(|r| exclude_id != Some(r.id()))
        .find(|r| r.natural_key() == key)
}

/// Duplicate check for child rows that only need uniqueness inside their
/// parent (linked entities in a municipality, modules in a system).
pub fn has_duplicate_key<'a, I>(key: &NaturalKey, siblings: I, exclude_id: Option<&str>) -> bool
where
    I: IntoIterator<Item = (&'a str, NaturalKey)>,
{
    siblings
        .into_iter()
        .any(|(id, k)| exclude_id != Some(id) && &k == key)
}

// ============================================================================
// DUPLICATE SCAN (for data already in the store)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub kind: String,
    pub key: NaturalKey,
    /// Ids of every record sharing the key, in store order
    pub record_ids: Vec<String>,
    pub reason: String,
}

/// Group stored records by natural key and report every key held by more
/// than one record. Rows written before uniqueness was enforced, or by
/// another client, show up here.
pub fn find_duplicates<T: Record>(records: &[T]) -> Vec<DuplicateMatch> {
    let mut groups: HashMap<NaturalKey, Vec<String>> = HashMap::new();
    let mut order: Vec<NaturalKey> = Vec::new();

    for record in records {
        let key = record.natural_key();
        let ids = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Vec::new()
        });
        ids.push(record.id().to_string());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let ids = groups.remove(&key)?;
            if ids.len() < 2 {
                return None;
            }
            Some(DuplicateMatch {
                kind: T::KIND.to_string(),
                reason: format!("{} records share {}", ids.len(), key),
                key,
                record_ids: ids,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
