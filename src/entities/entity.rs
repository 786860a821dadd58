// 🏢 Entity - Contracting organizations identified by CNPJ

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::NaturalKey;
use crate::masks::{format_cnpj, strip_non_digits};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub meta: RecordMeta,

    /// CNPJ as typed (masked or not); compared stripped
    pub cnpj: String,

    /// Razão social
    pub corporate_name: String,

    /// Prefeitura, Câmara, Autarquia, ...
    pub entity_type: String,

    pub street: String,
    pub number: String,
    pub district: String,

    #[serde(default)]
    pub complement: String,

    pub city: String,
    pub cep: String,
    pub phone: String,

    #[serde(default)]
    pub notes: String,
}

impl Entity {
    pub fn new(cnpj: &str, corporate_name: &str, entity_type: &str) -> Self {
        Entity {
            meta: RecordMeta::default(),
            cnpj: cnpj.to_string(),
            corporate_name: corporate_name.to_string(),
            entity_type: entity_type.to_string(),
            street: String::new(),
            number: String::new(),
            district: String::new(),
            complement: String::new(),
            city: String::new(),
            cep: String::new(),
            phone: String::new(),
            notes: String::new(),
        }
    }

    /// Builder: postal address
    pub fn with_address(
        mut self,
        street: &str,
        number: &str,
        district: &str,
        city: &str,
        cep: &str,
    ) -> Self {
        self.street = street.to_string();
        self.number = number.to_string();
        self.district = district.to_string();
        self.city = city.to_string();
        self.cep = cep.to_string();
        self
    }

    /// Builder: contact phone
    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = phone.to_string();
        self
    }

    pub fn cnpj_digits(&self) -> String {
        strip_non_digits(&self.cnpj)
    }

    /// A complete, valid entity for tests.
    #[cfg(test)]
    pub(crate) fn sample(cnpj: &str) -> Self {
        Entity::new(cnpj, "Prefeitura Municipal de Exemplo", "Prefeitura")
            .with_address("Rua das Flores", "100", "Centro", "Exemplo", "01310-100")
            .with_phone("(11) 3333-4444")
    }
}

impl Record for Entity {
    const KIND: RegistryKind = RegistryKind::Entity;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::cnpj(&self.cnpj)
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.corporate_name.clone(),
            self.cnpj.clone(),
            self.cnpj_digits(),
            self.city.clone(),
        ]
    }

    fn columns() -> &'static [&'static str] {
        &["CNPJ", "Razão Social", "Tipo", "Cidade", "Telefone"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            format_cnpj(&self.cnpj),
            self.corporate_name.clone(),
            self.entity_type.clone(),
            self.city.clone(),
            self.phone.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_matches_stripped_and_masked_cnpj() {
        let e = Entity::sample("11.222.333/0001-81");
        assert!(e.matches("11222333"));
        assert!(e.matches("333/0001"));
        assert!(e.matches("prefeitura"));
        assert!(!e.matches("câmara"));
    }

    #[test]
    fn test_row_formats_cnpj() {
        let e = Entity::sample("11222333000181");
        assert_eq!(e.row()[0], "11.222.333/0001-81");
        assert_eq!(e.row().len(), Entity::columns().len());
    }
}
