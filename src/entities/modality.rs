// Bidding Modality - Pregão, Concorrência, Tomada de Preços, ...

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::NaturalKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiddingModality {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub description: String,

    #[serde(default)]
    pub notes: String,
}

impl BiddingModality {
    pub fn new(description: &str, notes: &str) -> Self {
        BiddingModality {
            meta: RecordMeta::default(),
            description: description.to_string(),
            notes: notes.to_string(),
        }
    }
}

impl Record for BiddingModality {
    const KIND: RegistryKind = RegistryKind::BiddingModality;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::description(&self.description)
    }

    fn search_fields(&self) -> Vec<String> {
        vec![self.description.clone()]
    }

    fn columns() -> &'static [&'static str] {
        &["Descrição", "Observações"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.description.clone(), self.notes.clone()]
    }
}
