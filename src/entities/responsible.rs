// 👤 Responsible Party - People accountable for contracts, identified by CPF

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::NaturalKey;
use crate::masks::{format_cpf, strip_non_digits};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsibleParty {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub name: String,
    pub cpf: String,
    pub rg: String,
    pub cell_phone: String,
}

impl ResponsibleParty {
    pub fn new(name: &str, cpf: &str, rg: &str, cell_phone: &str) -> Self {
        ResponsibleParty {
            meta: RecordMeta::default(),
            name: name.to_string(),
            cpf: cpf.to_string(),
            rg: rg.to_string(),
            cell_phone: cell_phone.to_string(),
        }
    }
}

impl Record for ResponsibleParty {
    const KIND: RegistryKind = RegistryKind::ResponsibleParty;

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
        vec![
            self.name.clone(),
            self.cpf.clone(),
            strip_non_digits(&self.cpf),
        ]
    }

    fn columns() -> &'static [&'static str] {
        &["Nome", "CPF", "RG", "Celular"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format_cpf(&self.cpf),
            self.rg.clone(),
            self.cell_phone.clone(),
        ]
    }
}
