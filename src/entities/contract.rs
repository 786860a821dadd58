// 📄 Contract - Government contracts with their amendments (aditivos),
// linked entities, contracted systems and attached documents

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::{has_duplicate_key, NaturalKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Ativo,
    Suspenso,
    Encerrado,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Ativo => "Ativo",
            ContractStatus::Suspenso => "Suspenso",
            ContractStatus::Encerrado => "Encerrado",
        }
    }
}

// ============================================================================
// AMENDMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    #[serde(default)]
    pub id: String,

    /// e.g. "001/2023"
    pub number: String,
    pub registration_date: NaiveDate,
    pub signature_date: NaiveDate,
    pub validity_start: NaiveDate,
    pub validity_end: NaiveDate,

    /// Prorrogação, Reajuste, ...
    pub kind: String,

    #[serde(default)]
    pub correction_index: Option<String>,

    #[serde(default)]
    pub complement_value: Option<f64>,
}

// ============================================================================
// LINKED ENTITY
// ============================================================================

/// Entity bound by the contract (unique by CNPJ within it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEntity {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub cnpj: String,
    pub entity_type: String,
}

impl ContractEntity {
    pub fn new(name: &str, cnpj: &str, entity_type: &str) -> Self {
        ContractEntity {
            id: String::new(),
            name: name.to_string(),
            cnpj: cnpj.to_string(),
            entity_type: entity_type.to_string(),
        }
    }
}

// ============================================================================
// CONTRACTED SYSTEM
// ============================================================================

/// System licensed under the contract (unique by acronym within it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSystem {
    #[serde(default)]
    pub id: String,
    pub acronym: String,
    pub name: String,
    pub value: f64,

    #[serde(default)]
    pub deployed: bool,
    #[serde(default)]
    pub deployment_date: Option<NaiveDate>,

    /// Em implantação, Em produção, ...
    #[serde(default)]
    pub status: String,
}

impl ContractSystem {
    pub fn new(acronym: &str, name: &str, value: f64) -> Self {
        ContractSystem {
            id: String::new(),
            acronym: acronym.to_string(),
            name: name.to_string(),
            value,
            deployed: false,
            deployment_date: None,
            status: String::new(),
        }
    }

    /// Builder: mark as deployed on `date`
    pub fn deployed_on(mut self, date: NaiveDate) -> Self {
        self.deployed = true;
        self.deployment_date = Some(date);
        self
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// File formats accepted as contract documents (PDF and Word).
pub const DOCUMENT_CONTENT_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Dated history entry with the metadata of its attached file. The file
/// content itself lives outside the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    pub description: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub file_size: u64,
}

impl ContractDocument {
    pub fn new(date: NaiveDate, description: &str, file_name: &str, file_type: &str, file_size: u64) -> Self {
        ContractDocument {
            id: String::new(),
            date,
            description: description.to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_size,
        }
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(flatten)]
    pub meta: RecordMeta,

    /// Display sequence ("00001"), assigned by the registry on create
    #[serde(default)]
    pub sequence: String,

    pub status: ContractStatus,
    pub contract_type: String,
    pub municipality: String,

    #[serde(default)]
    pub ibge_code: Option<String>,
    #[serde(default)]
    pub population: Option<u64>,

    pub contract_number: String,
    pub contract_date: NaiveDate,
    /// Four digits, e.g. "2024"
    pub contract_year: String,

    pub bidding_modality: String,
    pub bidding_process_number: String,

    pub signature_date: NaiveDate,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    pub validity_start: NaiveDate,
    pub validity_end: NaiveDate,
    #[serde(default)]
    pub closing_date: Option<NaiveDate>,

    #[serde(default)]
    pub correction_index: Option<String>,
    #[serde(default)]
    pub index_month: Option<u32>,
    #[serde(default)]
    pub index_year: Option<String>,

    pub value: f64,

    /// Responsible party (by name or CPF)
    pub responsible: String,
    pub contractor_representative: String,

    #[serde(default)]
    pub landline: Option<String>,
    #[serde(default)]
    pub cell_phone: Option<String>,

    #[serde(default)]
    pub amendments: Vec<Amendment>,

    #[serde(default)]
    pub entities: Vec<ContractEntity>,

    #[serde(default)]
    pub systems: Vec<ContractSystem>,

    #[serde(default)]
    pub documents: Vec<ContractDocument>,
}

impl Contract {
    /// Total value including every amendment's complement.
    pub fn total_value(&self) -> f64 {
        self.value
            + self
                .amendments
                .iter()
                .filter_map(|a| a.complement_value)
                .sum::<f64>()
    }

    /// Latest validity end across the contract and its amendments.
    pub fn effective_end(&self) -> NaiveDate {
        self.amendments
            .iter()
            .map(|a| a.validity_end)
            .fold(self.validity_end, |acc, d| acc.max(d))
    }

    pub fn add_amendment(&mut self, mut amendment: Amendment) -> String {
        if amendment.id.is_empty() {
            amendment.id = uuid::Uuid::new_v4().to_string();
        }
        let id = amendment.id.clone();
        self.amendments.push(amendment);
        id
    }

    /// Bind an entity, rejecting a CNPJ already bound to this contract.
    pub fn add_entity(&mut self, mut entity: ContractEntity) -> Result<String, String> {
        let key = NaturalKey::cnpj(&entity.cnpj);
        let taken = has_duplicate_key(
            &key,
            self.entities
                .iter()
                .map(|e| (e.id.as_str(), NaturalKey::cnpj(&e.cnpj))),
            None,
        );
        if taken {
            return Err(format!("CNPJ já vinculado a este contrato: {}", entity.cnpj));
        }
        if entity.id.is_empty() {
            entity.id = uuid::Uuid::new_v4().to_string();
        }
        let id = entity.id.clone();
        self.entities.push(entity);
        Ok(id)
    }

    /// Add a contracted system, rejecting an acronym already listed.
    pub fn add_system(&mut self, mut system: ContractSystem) -> Result<String, String> {
        let key = NaturalKey::acronym(&system.acronym);
        let taken = has_duplicate_key(
            &key,
            self.systems
                .iter()
                .map(|s| (s.id.as_str(), NaturalKey::acronym(&s.acronym))),
            None,
        );
        if taken {
            return Err(format!("Sistema já incluído neste contrato: {}", system.acronym));
        }
        if system.id.is_empty() {
            system.id = uuid::Uuid::new_v4().to_string();
        }
        let id = system.id.clone();
        self.systems.push(system);
        Ok(id)
    }

    pub fn add_document(&mut self, mut document: ContractDocument) -> String {
        if document.id.is_empty() {
            document.id = uuid::Uuid::new_v4().to_string();
        }
        let id = document.id.clone();
        self.documents.push(document);
        id
    }

    pub fn remove_document(&mut self, document_id: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != document_id);
        self.documents.len() != before
    }

    /// Sum of the contracted systems' values.
    pub fn systems_value(&self) -> f64 {
        self.systems.iter().map(|s| s.value).sum()
    }

    /// A complete, valid contract for tests.
    #[cfg(test)]
    pub(crate) fn sample(number: &str, year: &str) -> Self {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        Contract {
            meta: RecordMeta::default(),
            sequence: String::new(),
            status: ContractStatus::Ativo,
            contract_type: "Prestação de Serviços".to_string(),
            municipality: "Campinas".to_string(),
            ibge_code: Some("3509502".to_string()),
            population: Some(1_139_047),
            contract_number: number.to_string(),
            contract_date: d(2024, 1, 10),
            contract_year: year.to_string(),
            bidding_modality: "Pregão Eletrônico".to_string(),
            bidding_process_number: "PL-12/2023".to_string(),
            signature_date: d(2024, 1, 15),
            publication_date: Some(d(2024, 1, 20)),
            validity_start: d(2024, 2, 1),
            validity_end: d(2025, 1, 31),
            closing_date: None,
            correction_index: Some("IPCA".to_string()),
            index_month: Some(1),
            index_year: Some("2024".to_string()),
            value: 120_000.0,
            responsible: "Maria Souza".to_string(),
            contractor_representative: "João Lima".to_string(),
            landline: None,
            cell_phone: Some("(19) 98765-4321".to_string()),
            amendments: Vec::new(),
            entities: Vec::new(),
            systems: Vec::new(),
            documents: Vec::new(),
        }
    }
}

impl Record for Contract {
    const KIND: RegistryKind = RegistryKind::Contract;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::contract(&self.contract_number, &self.contract_year)
    }

    fn needs_sequence(&self) -> bool {
        true
    }

    fn set_sequence(&mut self, sequence: String) {
        self.sequence = sequence;
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.contract_number.clone(),
            self.municipality.clone(),
            self.responsible.clone(),
            self.bidding_process_number.clone(),
        ]
    }

    fn columns() -> &'static [&'static str] {
        &[
            "Sequencial",
            "Número",
            "Ano",
            "Município",
            "Situação",
            "Vigência",
            "Valor",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sequence.clone(),
            self.contract_number.clone(),
            self.contract_year.clone(),
            self.municipality.clone(),
            self.status.as_str().to_string(),
            format!(
                "{} a {}",
                self.validity_start.format("%d/%m/%Y"),
                self.effective_end().format("%d/%m/%Y")
            ),
            format!("{:.2}", self.total_value()),
        ]
    }
}
