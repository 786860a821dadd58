// 🖥️ System - Licensed software products, with their modules

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::{has_duplicate_key, NaturalKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemModule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub description: String,
}

impl SystemModule {
    pub fn new(name: &str, description: &str) -> Self {
        SystemModule {
            id: String::new(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    #[serde(flatten)]
    pub meta: RecordMeta,

    /// Sigla, e.g. "SIAFIC"
    pub acronym: String,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub modules: Vec<SystemModule>,
}

impl System {
    pub fn new(acronym: &str, name: &str, description: &str) -> Self {
        System {
            meta: RecordMeta::default(),
            acronym: acronym.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            modules: Vec::new(),
        }
    }

    /// Add a module; module names are unique (case-insensitive) per system.
    pub fn add_module(&mut self, mut module: SystemModule) -> Result<String, String> {
        let key = NaturalKey::description(&module.name);
        let taken = has_duplicate_key(
            &key,
            self.modules
                .iter()
                .map(|m| (m.id.as_str(), NaturalKey::description(&m.name))),
            None,
        );
        if taken {
            return Err(format!("Módulo já cadastrado neste sistema: {}", module.name));
        }
        if module.id.is_empty() {
            module.id = uuid::Uuid::new_v4().to_string();
        }
        let id = module.id.clone();
        self.modules.push(module);
        Ok(id)
    }

    pub fn remove_module(&mut self, module_id: &str) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| m.id != module_id);
        self.modules.len() != before
    }
}

impl Record for System {
    const KIND: RegistryKind = RegistryKind::System;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::acronym(&self.acronym)
    }

    fn search_fields(&self) -> Vec<String> {
        vec![self.acronym.clone(), self.name.clone()]
    }

    fn columns() -> &'static [&'static str] {
        &["Sigla", "Nome", "Descrição", "Módulos"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.acronym.clone(),
            self.name.clone(),
            self.description.clone(),
            self.modules.len().to_string(),
        ]
    }
}
