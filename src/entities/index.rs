// 📈 Correction Index - Monthly values of IPCA, IGP-M, ...

use super::{Record, RecordMeta, RegistryKind};
use crate::deduplication::NaturalKey;
use serde::{Deserialize, Serialize};

const MONTHS: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

/// Month name for 1..=12, empty otherwise.
pub fn month_name(month: u32) -> &'static str {
    match month {
        1..=12 => MONTHS[(month - 1) as usize],
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionIndex {
    #[serde(flatten)]
    pub meta: RecordMeta,

    pub name: String,
    /// 1..=12
    pub month: u32,
    pub year: i32,
    pub value: f64,
}

impl CorrectionIndex {
    pub fn new(name: &str, month: u32, year: i32, value: f64) -> Self {
        CorrectionIndex {
            meta: RecordMeta::default(),
            name: name.to_string(),
            month,
            year,
            value,
        }
    }
}

impl Record for CorrectionIndex {
    const KIND: RegistryKind = RegistryKind::CorrectionIndex;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> NaturalKey {
        NaturalKey::index(&self.name, self.month, self.year)
    }

    // Search also hits the month name ("março") and the year
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            month_name(self.month).to_string(),
            self.year.to_string(),
        ]
    }

    fn columns() -> &'static [&'static str] {
        &["Índice", "Mês", "Ano", "Valor"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            month_name(self.month).to_string(),
            self.year.to_string(),
            format!("{:.4}", self.value),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), "Janeiro");
        assert_eq!(month_name(12), "Dezembro");
        assert_eq!(month_name(0), "");
        assert_eq!(month_name(13), "");
    }

    #[test]
    fn test_search_by_month_name() {
        let idx = CorrectionIndex::new("IPCA", 3, 2024, 0.16);
        assert!(idx.matches("março"));
        assert!(idx.matches("2024"));
        assert!(!idx.matches("igp"));
    }
}
