// 📐 Form Schemas - Field rules for every registry form
//
// Each registry form is bound to a schema. A schema never stops at the first
// problem: it collects every failing field so the form can mark them all.
// Messages are the user-facing texts shown under each field.

use crate::deduplication::{has_duplicate_key, NaturalKey};
use crate::documents::{validate_cnpj, validate_cpf, validate_date_on};
use crate::entities::{
    Amendment, BiddingModality, Contract, ContractDocument, ContractEntity, ContractStatus,
    ContractSystem, CorrectionIndex, Entity, LinkedEntity, Municipality, ResponsibleParty, System,
    SystemModule, User, DOCUMENT_CONTENT_TYPES,
};
use crate::masks::strip_non_digits;
use chrono::{Datelike, Local, NaiveDate};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

pub trait Validate {
    /// Validate against a fixed calendar date (for "not in the future" and
    /// "year ≤ next year" rules).
    fn validate_on(&self, today: NaiveDate) -> ValidationResult;

    fn validate(&self) -> ValidationResult {
        self.validate_on(Local::now().date_naive())
    }
}

// ============================================================================
// FORM VALIDATOR (error collector)
// ============================================================================

pub struct FormValidator {
    context: String,
    errors: Vec<ValidationError>,
}

impl FormValidator {
    pub fn new(context: impl Into<String>) -> Self {
        FormValidator {
            context: context.into(),
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: self.context.clone(),
        });
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.error(field, message);
        }
    }

    /// Minimum length in characters, after trimming.
    pub fn min_len(&mut self, field: &str, value: &str, min: usize, message: &str) {
        self.check(value.trim().chars().count() >= min, field, message);
    }

    /// Minimum number of digits (for masked inputs such as phone and CEP).
    pub fn min_digits(&mut self, field: &str, value: &str, min: usize, message: &str) {
        self.check(strip_non_digits(value).len() >= min, field, message);
    }

    pub fn cpf(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.error(field, "CPF é obrigatório");
        } else if !validate_cpf(value) {
            self.error(field, "CPF inválido");
        }
    }

    pub fn cnpj(&mut self, field: &str, value: &str) {
        self.check(validate_cnpj(value), field, "CNPJ inválido");
    }

    /// Fold another form's errors in, prefixing their field names.
    pub fn nested(&mut self, prefix: &str, result: ValidationResult) {
        if let Err(errors) = result {
            for e in errors {
                self.errors.push(ValidationError {
                    field: format!("{}.{}", prefix, e.field),
                    message: e.message,
                    context: self.context.clone(),
                });
            }
        }
    }

    /// Flag each row whose key repeats a row before it, as
    /// `{prefix}[{index}].{field}`.
    pub fn unique_rows<T>(
        &mut self,
        prefix: &str,
        field: &str,
        rows: &[T],
        key: impl Fn(&T) -> NaturalKey,
        message: &str,
    ) {
        for (i, row) in rows.iter().enumerate() {
            let earlier = rows[..i].iter().map(|r| ("", key(r)));
            if has_duplicate_key(&key(row), earlier, None) {
                self.error(&format!("{}[{}].{}", prefix, i, field), message);
            }
        }
    }

    pub fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Year typed as four digits, after 1900 and at most next year.
fn valid_contract_year(value: &str, today: NaiveDate) -> bool {
    if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match value.parse::<i32>() {
        Ok(year) => year > 1900 && year <= today.year() + 1,
        Err(_) => false,
    }
}

// ============================================================================
// REGISTRY SCHEMAS
// ============================================================================

impl Validate for Entity {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("Entity");
        v.cnpj("cnpj", &self.cnpj);
        v.min_len(
            "corporate_name",
            &self.corporate_name,
            3,
            "A razão social deve ter pelo menos 3 caracteres",
        );
        v.min_len("entity_type", &self.entity_type, 1, "Selecione um tipo de entidade");
        v.min_len("street", &self.street, 3, "Informe a rua");
        v.min_len("number", &self.number, 1, "Informe o número");
        v.min_len("district", &self.district, 2, "Informe o bairro");
        v.min_len("city", &self.city, 2, "Informe a cidade");
        v.min_digits("cep", &self.cep, 8, "Informe o CEP válido");
        v.min_digits("phone", &self.phone, 10, "Informe um telefone válido");
        v.finish()
    }
}

impl Validate for LinkedEntity {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("LinkedEntity");
        v.cnpj("cnpj", &self.cnpj);
        v.min_len(
            "corporate_name",
            &self.corporate_name,
            3,
            "A razão social deve ter pelo menos 3 caracteres",
        );
        v.min_len("entity_type", &self.entity_type, 1, "Selecione um tipo de entidade");
        v.finish()
    }
}

impl Validate for Municipality {
    fn validate_on(&self, today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("Municipality");
        v.min_len("name", &self.name, 3, "O nome deve ter pelo menos 3 caracteres");
        v.min_len("ibge_code", &self.ibge_code, 7, "Código IBGE inválido");
        v.check(
            self.population >= 1,
            "population",
            "Informe a quantidade de habitantes",
        );
        v.check(
            self.distance_km.is_finite() && self.distance_km >= 0.0,
            "distance_km",
            "Informe a distância em KM",
        );
        for (i, linked) in self.linked_entities.iter().enumerate() {
            v.nested(&format!("linked_entities[{}]", i), linked.validate_on(today));
        }
        v.unique_rows(
            "linked_entities",
            "cnpj",
            &self.linked_entities,
            |e| NaturalKey::cnpj(&e.cnpj),
            "CNPJ já vinculado a este município",
        );
        v.finish()
    }
}

impl Validate for CorrectionIndex {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("CorrectionIndex");
        v.min_len("name", &self.name, 2, "O nome do índice deve ter pelo menos 2 caracteres");
        v.check((1..=12).contains(&self.month), "month", "Selecione um mês");
        v.check((1900..=2100).contains(&self.year), "year", "Ano inválido");
        v.check(
            self.value.is_finite() && self.value >= 0.0,
            "value",
            "O valor deve ser maior ou igual a zero",
        );
        v.finish()
    }
}

impl Validate for BiddingModality {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("BiddingModality");
        v.min_len(
            "description",
            &self.description,
            3,
            "A descrição deve ter pelo menos 3 caracteres",
        );
        v.finish()
    }
}

impl Validate for ResponsibleParty {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("ResponsibleParty");
        v.min_len("name", &self.name, 3, "O nome deve ter pelo menos 3 caracteres");
        v.cpf("cpf", &self.cpf);
        v.min_len("rg", &self.rg, 5, "RG inválido");
        v.min_digits("cell_phone", &self.cell_phone, 10, "Celular inválido");
        v.finish()
    }
}

impl Validate for SystemModule {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("SystemModule");
        v.min_len("name", &self.name, 2, "O nome deve ter pelo menos 2 caracteres");
        v.min_len(
            "description",
            &self.description,
            3,
            "A descrição deve ter pelo menos 3 caracteres",
        );
        v.finish()
    }
}

impl Validate for System {
    fn validate_on(&self, today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("System");
        v.min_len("acronym", &self.acronym, 2, "A sigla deve ter pelo menos 2 caracteres");
        v.min_len("name", &self.name, 3, "O nome deve ter pelo menos 3 caracteres");
        v.min_len(
            "description",
            &self.description,
            3,
            "A descrição deve ter pelo menos 3 caracteres",
        );
        for (i, module) in self.modules.iter().enumerate() {
            v.nested(&format!("modules[{}]", i), module.validate_on(today));
        }
        v.unique_rows(
            "modules",
            "name",
            &self.modules,
            |m| NaturalKey::description(&m.name),
            "Módulo já cadastrado neste sistema",
        );
        v.finish()
    }
}

impl Validate for User {
    fn validate_on(&self, today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("User");
        v.min_len("name", &self.name, 1, "Nome é obrigatório");
        v.cpf("cpf", &self.cpf);

        if self.date_of_birth.trim().is_empty() {
            v.error("date_of_birth", "Data de nascimento é obrigatória");
        } else if !validate_date_on(&self.date_of_birth, today) {
            v.error("date_of_birth", "Data de nascimento inválida");
        }

        let unknown = self.permissions.unknown();
        if !unknown.is_empty() {
            v.error(
                "permissions",
                format!("Permissões desconhecidas: {}", unknown.join(", ")),
            );
        }
        v.finish()
    }
}

impl Validate for Amendment {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("Amendment");
        v.min_len("number", &self.number, 1, "Número do aditivo é obrigatório");
        v.min_len("kind", &self.kind, 1, "Tipo do aditivo é obrigatório");
        v.check(
            self.validity_end >= self.validity_start,
            "validity_end",
            "O fim da vigência deve ser posterior ao início",
        );
        if let Some(value) = self.complement_value {
            v.check(
                value.is_finite() && value >= 0.0,
                "complement_value",
                "Valor complementar inválido",
            );
        }
        v.finish()
    }
}

impl Validate for ContractEntity {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("ContractEntity");
        v.min_len("name", &self.name, 3, "O nome deve ter pelo menos 3 caracteres");
        v.cnpj("cnpj", &self.cnpj);
        v.min_len("entity_type", &self.entity_type, 1, "Selecione um tipo de entidade");
        v.finish()
    }
}

impl Validate for ContractSystem {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("ContractSystem");
        v.min_len("acronym", &self.acronym, 2, "A sigla deve ter pelo menos 2 caracteres");
        v.min_len("name", &self.name, 3, "O nome deve ter pelo menos 3 caracteres");
        v.check(
            self.value.is_finite() && self.value >= 0.0,
            "value",
            "O valor deve ser maior ou igual a zero",
        );
        v.check(
            !self.deployed || self.deployment_date.is_some(),
            "deployment_date",
            "Informe a data de implantação",
        );
        v.finish()
    }
}

impl Validate for ContractDocument {
    fn validate_on(&self, _today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("ContractDocument");
        v.min_len("description", &self.description, 1, "Informe o histórico do documento");
        if self.file_name.trim().is_empty() {
            v.error("file_name", "Selecione um arquivo para anexar");
        } else {
            v.check(
                DOCUMENT_CONTENT_TYPES.contains(&self.file_type.as_str()),
                "file_type",
                "Formato de arquivo inválido! Somente PDF e Word são aceitos.",
            );
        }
        v.finish()
    }
}

impl Validate for Contract {
    fn validate_on(&self, today: NaiveDate) -> ValidationResult {
        let mut v = FormValidator::new("Contract");
        v.min_len("contract_type", &self.contract_type, 1, "Tipo de contrato é obrigatório");
        v.min_len("municipality", &self.municipality, 1, "Município é obrigatório");
        v.min_len(
            "contract_number",
            &self.contract_number,
            1,
            "Número do contrato é obrigatório",
        );
        if self.contract_year.len() != 4 {
            v.error("contract_year", "O ano deve ter 4 dígitos");
        } else if !valid_contract_year(&self.contract_year, today) {
            v.error("contract_year", "Ano inválido");
        }
        v.min_len(
            "bidding_modality",
            &self.bidding_modality,
            1,
            "Modalidade de licitação é obrigatória",
        );
        v.min_len(
            "bidding_process_number",
            &self.bidding_process_number,
            1,
            "Número do processo licitatório é obrigatório",
        );
        v.check(
            self.validity_end >= self.validity_start,
            "validity_end",
            "O fim da vigência deve ser posterior ao início",
        );

        match (self.status, self.closing_date) {
            (ContractStatus::Encerrado, None) => {
                v.error("closing_date", "Informe a data de encerramento")
            }
            (status, Some(_)) if status != ContractStatus::Encerrado => v.error(
                "closing_date",
                "Data de encerramento só é permitida para contratos encerrados",
            ),
            _ => {}
        }

        if let Some(index_year) = &self.index_year {
            if !index_year.is_empty() && !valid_contract_year(index_year, today) {
                v.error("index_year", "Ano inválido");
            }
        }
        if let Some(month) = self.index_month {
            v.check((1..=12).contains(&month), "index_month", "Mês inválido");
        }

        v.check(
            self.value.is_finite() && self.value >= 0.0,
            "value",
            "Valor do contrato é obrigatório",
        );
        v.min_len("responsible", &self.responsible, 1, "Responsável é obrigatório");
        v.min_len(
            "contractor_representative",
            &self.contractor_representative,
            1,
            "Nome do responsável contratante é obrigatório",
        );

        for (i, amendment) in self.amendments.iter().enumerate() {
            v.nested(&format!("amendments[{}]", i), amendment.validate_on(today));
        }
        for (i, entity) in self.entities.iter().enumerate() {
            v.nested(&format!("entities[{}]", i), entity.validate_on(today));
        }
        v.unique_rows(
            "entities",
            "cnpj",
            &self.entities,
            |e| NaturalKey::cnpj(&e.cnpj),
            "CNPJ já vinculado a este contrato",
        );
        for (i, system) in self.systems.iter().enumerate() {
            v.nested(&format!("systems[{}]", i), system.validate_on(today));
        }
        v.unique_rows(
            "systems",
            "acronym",
            &self.systems,
            |s| NaturalKey::acronym(&s.acronym),
            "Sistema já incluído neste contrato",
        );
        for (i, document) in self.documents.iter().enumerate() {
            v.nested(&format!("documents[{}]", i), document.validate_on(today));
        }
        v.finish()
    }
}

// ============================================================================
// PASSWORD FORMS
// ============================================================================

pub const MIN_PASSWORD_LEN: usize = 6;

/// Password + confirmation typed on the user form when creating a user.
pub fn validate_new_password(password: &str, confirmation: &str) -> ValidationResult {
    let mut v = FormValidator::new("User");
    if password.is_empty() {
        v.error("password", "Senha é obrigatória para novos usuários");
    } else if password != confirmation {
        v.error("password", "As senhas não conferem");
    }
    v.finish()
}

/// The change-password form.
pub fn validate_password_change(current: &str, new: &str, confirmation: &str) -> ValidationResult {
    let mut v = FormValidator::new("PasswordChange");
    v.check(
        current.chars().count() >= MIN_PASSWORD_LEN,
        "current_password",
        "A senha atual deve ter pelo menos 6 caracteres",
    );
    v.check(
        new.chars().count() >= MIN_PASSWORD_LEN,
        "new_password",
        "A nova senha deve ter pelo menos 6 caracteres",
    );
    v.check(
        new == confirmation,
        "confirm_password",
        "As senhas não conferem",
    );
    v.finish()
}

// ============================================================================
// TESTS
// ============================================================================
