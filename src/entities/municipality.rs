// 🏙️ Municipality - Identified by IBGE code, with linked entities

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::{has_duplicate_key, NaturalKey};
use serde::{Deserialize, Serialize};

/// Entity attached to a municipality (unique by CNPJ within it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    #[serde(default)]
    pub id: String,
    pub cnpj: String,
    pub corporate_name: String,
    pub entity_type: String,
}

impl LinkedEntity {
    pub fn new(cnpj: &str, corporate_name: &str, entity_type: &str) -> Self {
        LinkedEntity {
            id: String::new(),
            cnpj: cnpj.to_string(),
            corporate_name: corporate_name.to_string(),
            entity_type: entity_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub name: String,
    pub ibge_code: String,
    pub population: u64,
    pub distance_km: f64,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub linked_entities: Vec<LinkedEntity>,
}

impl Municipality {
    pub fn new(name: &str, ibge_code: &str, population: u64, distance_km: f64) -> Self {
        Municipality {
            meta: RecordMeta::default(),
            name: name.to_string(),
            ibge_code: ibge_code.to_string(),
            population,
            distance_km,
            notes: String::new(),
            linked_entities: Vec::new(),
        }
    }

    /// True when another linked entity (not `exclude_id`) has the same CNPJ.
    pub fn is_linked_cnpj_duplicate(&self, cnpj: &str, exclude_id: Option<&str>) -> bool {
        let key = NaturalKey::cnpj(cnpj);
        has_duplicate_key(
            &key,
            self.linked_entities
                .iter()
                .map(|e| (e.id.as_str(), NaturalKey::cnpj(&e.cnpj))),
            exclude_id,
        )
    }

    /// Attach an entity, rejecting a CNPJ already linked here.
    /// Returns the id assigned to the link.
    pub fn link_entity(&mut self, mut entity: LinkedEntity) -> Result<String, String> {
        if self.is_linked_cnpj_duplicate(&entity.cnpj, None) {
            return Err(format!(
                "CNPJ já vinculado a este município: {}",
                entity.cnpj
            ));
        }
        if entity.id.is_empty() {
            entity.id = uuid::Uuid::new_v4().to_string();
        }
        let id = entity.id.clone();
        self.linked_entities.push(entity);
        Ok(id)
    }

    pub fn unlink_entity(&mut self, link_id: &str) -> bool {
        let before = self.linked_entities.len();
        self.linked_entities.retain(|e| e.id != link_id);
        self.linked_entities.len() != before
    }
}

impl Record for Municipality {
    const KIND: RegistryKind = RegistryKind::Municipality;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::ibge(&self.ibge_code)
    }

    fn search_fields(&self) -> Vec<String> {
        vec![self.name.clone(), self.ibge_code.clone()]
    }

    fn columns() -> &'static [&'static str] {
        &["Nome", "Código IBGE", "Habitantes", "Distância (KM)", "Entidades"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.ibge_code.clone(),
            self.population.to_string(),
            format!("{:.1}", self.distance_km),
            self.linked_entities.len().to_string(),
        ]
    }
}
