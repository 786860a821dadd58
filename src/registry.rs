// 🗂️ Registry Service - The create/edit/delete pipeline shared by every form
//
// Every operation runs the same gates in the same order:
//   1. permission (session + policy)
//   2. form schema
//   3. natural-key uniqueness against the store
//   4. write + audit event
//
// The service borrows its connection, session and policy; it owns nothing.

use crate::db::{self, Event};
use crate::deduplication::{find_duplicates, DuplicateMatch, NaturalKey};
use crate::entities::{
    Amendment, Contract, ContractDocument, ContractEntity, ContractSystem, LinkedEntity,
    Municipality, Record, RecordMeta, RegistryKind, System, SystemModule, User,
};
use crate::error::{RegistryError, RegistryResult};
use crate::permissions::{Permission, PermissionPolicy};
use crate::schema::{validate_new_password, Validate, ValidationError};
use crate::session::{hash_password, Session};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info, warn};

/// Run `$body` with `$T` bound to the record type of a runtime kind.
macro_rules! with_record_type {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            RegistryKind::Entity => {
                type $T = crate::entities::Entity;
                $body
            }
            RegistryKind::Municipality => {
                type $T = crate::entities::Municipality;
                $body
            }
            RegistryKind::CorrectionIndex => {
                type $T = crate::entities::CorrectionIndex;
                $body
            }
            RegistryKind::BiddingModality => {
                type $T = crate::entities::BiddingModality;
                $body
            }
            RegistryKind::ResponsibleParty => {
                type $T = crate::entities::ResponsibleParty;
                $body
            }
            RegistryKind::System => {
                type $T = crate::entities::System;
                $body
            }
            RegistryKind::User => {
                type $T = crate::entities::User;
                $body
            }
            RegistryKind::Contract => {
                type $T = crate::entities::Contract;
                $body
            }
        }
    };
}

/// Display columns plus one row per record, for kinds chosen at runtime.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub kind: RegistryKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct RegistryService<'a> {
    conn: &'a Connection,
    session: &'a Session,
    policy: &'a PermissionPolicy,
}

impl<'a> RegistryService<'a> {
    pub fn new(conn: &'a Connection, session: &'a Session, policy: &'a PermissionPolicy) -> Self {
        RegistryService {
            conn,
            session,
            policy,
        }
    }

    fn require(&self, permission: Permission) -> RegistryResult<()> {
        self.session.require(self.policy, permission).map_err(|e| {
            warn!(actor = self.session.actor(), permission = %permission, "operation rejected");
            e
        })
    }

    fn validate<T: Validate>(&self, kind: RegistryKind, record: &T) -> RegistryResult<()> {
        record.validate().map_err(|errors| {
            debug!(kind = %kind, ?errors, "validation failed");
            RegistryError::Validation(errors)
        })
    }

    /// Reject when another stored record holds the same natural key.
    fn ensure_unique<T: Record>(&self, record: &T, exclude_id: Option<&str>) -> RegistryResult<()> {
        let key = record.natural_key();
        let conflicts: Vec<T> = db::find_by_natural_key(self.conn, &key, exclude_id)?;
        if let Some(existing) = conflicts.first() {
            warn!(kind = %T::KIND, key = %key, existing = existing.id(), "duplicate rejected");
            return Err(RegistryError::Duplicate {
                kind: T::KIND.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn audit<S: Serialize>(
        &self,
        event_type: &str,
        kind: RegistryKind,
        id: &str,
        data: &S,
    ) -> RegistryResult<()> {
        let event = Event::new(
            event_type,
            kind.table_name(),
            id,
            serde_json::to_value(data)?,
            self.session.actor(),
        );
        db::insert_event(self.conn, &event)?;
        Ok(())
    }

    fn not_found(kind: RegistryKind, id: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Parent of a nested row, loaded under the caller's `edit` gate.
    fn parent<T: Record>(&self, id: &str) -> RegistryResult<T> {
        db::get_record(self.conn, id)?.ok_or_else(|| Self::not_found(T::KIND, id))
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    pub fn create<T: Record>(&self, mut record: T) -> RegistryResult<T> {
        self.require(Permission::Create)?;
        self.validate(T::KIND, &record)?;
        self.ensure_unique(&record, None)?;

        // Identity and timestamps never come from the caller
        *record.meta_mut() = RecordMeta::default();
        record.meta_mut().init();
        if record.needs_sequence() {
            record.set_sequence(db::next_contract_sequence(self.conn)?);
        }
        db::insert_record(self.conn, &record)?;
        self.audit("created", T::KIND, record.id(), &record.natural_key())?;

        info!(kind = %T::KIND, id = record.id(), key = %record.natural_key(), "record created");
        Ok(record)
    }

    pub fn update<T: Record>(&self, mut record: T) -> RegistryResult<T> {
        self.require(Permission::Edit)?;

        let id = record.id().to_string();
        let Some(stored) = db::get_record::<T>(self.conn, &id)? else {
            return Err(Self::not_found(T::KIND, &id));
        };

        self.validate(T::KIND, &record)?;
        self.ensure_unique(&record, Some(&id))?;

        record.meta_mut().created_at = stored.meta().created_at;
        record.meta_mut().touch();
        db::update_record(self.conn, &record)?;
        self.audit("updated", T::KIND, &id, &record.natural_key())?;

        info!(kind = %T::KIND, id = %id, "record updated");
        Ok(record)
    }

    pub fn delete(&self, kind: RegistryKind, id: &str) -> RegistryResult<()> {
        self.require(Permission::Delete)?;

        if !db::delete_record(self.conn, kind, id)? {
            return Err(Self::not_found(kind, id));
        }
        self.audit("deleted", kind, id, &serde_json::Value::Null)?;

        info!(kind = %kind, id = id, "record deleted");
        Ok(())
    }

    pub fn get<T: Record>(&self, id: &str) -> RegistryResult<T> {
        self.require(Permission::View)?;
        db::get_record(self.conn, id)?.ok_or_else(|| Self::not_found(T::KIND, id))
    }

    pub fn list<T: Record>(&self) -> RegistryResult<Vec<T>> {
        self.require(Permission::View)?;
        Ok(db::list_records(self.conn)?)
    }

    /// Case-insensitive substring search over each record's searchable
    /// fields. An empty term returns everything.
    pub fn search<T: Record>(&self, term: &str) -> RegistryResult<Vec<T>> {
        Ok(self
            .list::<T>()?
            .into_iter()
            .filter(|r| r.matches(term))
            .collect())
    }

    /// Printable listing as CSV. Returns the number of rows written.
    pub fn print<T: Record, W: Write>(&self, writer: W, term: Option<&str>) -> RegistryResult<usize> {
        let records = self.search::<T>(term.unwrap_or(""))?;

        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(T::columns())
            .map_err(anyhow::Error::from)?;
        for record in &records {
            wtr.write_record(record.row())
                .map_err(anyhow::Error::from)?;
        }
        wtr.flush().map_err(anyhow::Error::from)?;

        info!(kind = %T::KIND, rows = records.len(), "listing printed");
        Ok(records.len())
    }

    /// Dashboard totals, straight from the store.
    pub fn counts(&self) -> RegistryResult<BTreeMap<String, i64>> {
        self.require(Permission::View)?;
        Ok(db::registry_counts(self.conn)?)
    }

    /// Natural keys held by more than one stored record.
    pub fn duplicates<T: Record>(&self) -> RegistryResult<Vec<DuplicateMatch>> {
        Ok(find_duplicates(&self.list::<T>()?))
    }

    /// Audit trail for one record, newest first.
    pub fn history(&self, kind: RegistryKind, id: &str) -> RegistryResult<Vec<Event>> {
        self.require(Permission::View)?;
        Ok(db::get_events_for_entity(self.conn, kind.table_name(), id)?)
    }

    // ========================================================================
    // RUNTIME KIND
    // ========================================================================

    pub fn listing(&self, kind: RegistryKind, term: &str) -> RegistryResult<Listing> {
        with_record_type!(kind, T => {
            let records = self.search::<T>(term)?;
            Ok(Listing {
                kind,
                columns: T::columns().iter().map(|c| c.to_string()).collect(),
                rows: records.iter().map(|r| r.row()).collect(),
            })
        })
    }

    pub fn print_kind<W: Write>(
        &self,
        kind: RegistryKind,
        writer: W,
        term: Option<&str>,
    ) -> RegistryResult<usize> {
        with_record_type!(kind, T => self.print::<T, W>(writer, term))
    }

    pub fn duplicates_of(&self, kind: RegistryKind) -> RegistryResult<Vec<DuplicateMatch>> {
        with_record_type!(kind, T => self.duplicates::<T>())
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Save the user form. New users need a password; on edit an empty
    /// password keeps the stored hash.
    pub fn save_user(&self, mut user: User, password: &str, confirmation: &str) -> RegistryResult<User> {
        if user.id().is_empty() {
            validate_new_password(password, confirmation).map_err(RegistryError::Validation)?;
            user.password_hash = hash_password(password)?;
            return self.create(user);
        }

        let Some(stored) = db::get_record::<User>(self.conn, user.id())? else {
            return Err(Self::not_found(RegistryKind::User, user.id()));
        };
        user.password_hash = if password.is_empty() {
            stored.password_hash
        } else {
            validate_new_password(password, confirmation).map_err(RegistryError::Validation)?;
            hash_password(password)?
        };
        self.update(user)
    }

    // ========================================================================
    // NESTED ROWS
    // ========================================================================

    /// Link an entity to a municipality. CNPJs are unique per municipality.
    pub fn link_entity(&self, municipality_id: &str, linked: LinkedEntity) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::Municipality, &linked)?;

        let mut municipality: Municipality = self.parent(municipality_id)?;
        let cnpj = linked.cnpj.clone();
        let link_id = municipality.link_entity(linked).map_err(|_| {
            warn!(municipality = municipality_id, cnpj = %cnpj, "linked entity rejected");
            RegistryError::Duplicate {
                kind: "LinkedEntity".to_string(),
                key: NaturalKey::cnpj(&cnpj).to_string(),
            }
        })?;
        self.update(municipality)?;
        Ok(link_id)
    }

    /// Add a module to a system. Names are unique per system.
    pub fn add_module(&self, system_id: &str, module: SystemModule) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::System, &module)?;

        let mut system: System = self.parent(system_id)?;
        let name = module.name.clone();
        let module_id = system.add_module(module).map_err(|_| RegistryError::Duplicate {
            kind: "SystemModule".to_string(),
            key: name.to_lowercase(),
        })?;
        self.update(system)?;
        Ok(module_id)
    }

    pub fn add_amendment(&self, contract_id: &str, amendment: Amendment) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::Contract, &amendment)?;

        let mut contract: Contract = self.parent(contract_id)?;
        let amendment_id = contract.add_amendment(amendment);
        self.update(contract)?;
        Ok(amendment_id)
    }

    /// Bind an entity to a contract. CNPJs are unique per contract.
    pub fn add_contract_entity(
        &self,
        contract_id: &str,
        entity: ContractEntity,
    ) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::Contract, &entity)?;

        let mut contract: Contract = self.parent(contract_id)?;
        let cnpj = entity.cnpj.clone();
        let entity_id = contract.add_entity(entity).map_err(|_| {
            warn!(contract = contract_id, cnpj = %cnpj, "contract entity rejected");
            RegistryError::Duplicate {
                kind: "ContractEntity".to_string(),
                key: NaturalKey::cnpj(&cnpj).to_string(),
            }
        })?;
        self.update(contract)?;
        Ok(entity_id)
    }

    /// Add a contracted system. Acronyms are unique per contract.
    pub fn add_contract_system(
        &self,
        contract_id: &str,
        system: ContractSystem,
    ) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::Contract, &system)?;

        let mut contract: Contract = self.parent(contract_id)?;
        let acronym = system.acronym.clone();
        let system_id = contract.add_system(system).map_err(|_| RegistryError::Duplicate {
            kind: "ContractSystem".to_string(),
            key: NaturalKey::acronym(&acronym).to_string(),
        })?;
        self.update(contract)?;
        Ok(system_id)
    }

    /// Attach a document entry (PDF or Word) to a contract.
    pub fn add_document(
        &self,
        contract_id: &str,
        document: ContractDocument,
    ) -> RegistryResult<String> {
        self.require(Permission::Edit)?;
        self.validate(RegistryKind::Contract, &document)?;

        let mut contract: Contract = self.parent(contract_id)?;
        let document_id = contract.add_document(document);
        self.update(contract)?;
        Ok(document_id)
    }

    pub fn remove_document(&self, contract_id: &str, document_id: &str) -> RegistryResult<()> {
        self.require(Permission::Edit)?;

        let mut contract: Contract = self.parent(contract_id)?;
        if !contract.remove_document(document_id) {
            return Err(RegistryError::NotFound {
                kind: "ContractDocument".to_string(),
                id: document_id.to_string(),
            });
        }
        self.update(contract)?;
        Ok(())
    }
}

/// Run a registry form schema against a JSON body (submit-time validation
/// for clients that only hold the form as JSON).
pub fn validate_json(kind: RegistryKind, body: serde_json::Value) -> RegistryResult<()> {
    with_record_type!(kind, T => {
        let record: T = serde_json::from_value(body).map_err(|e| {
            RegistryError::Validation(vec![ValidationError {
                field: "body".to_string(),
                message: e.to_string(),
                context: kind.to_string(),
            }])
        })?;
        record.validate().map_err(RegistryError::Validation)
    })
}

/// Create the first administrator on an empty user registry.
///
/// Only works while no user exists; afterwards users are managed through an
/// authenticated [`RegistryService::save_user`].
pub fn bootstrap_admin(
    conn: &Connection,
    user: User,
    password: &str,
    confirmation: &str,
) -> RegistryResult<User> {
    if db::count_records(conn, RegistryKind::User)? > 0 {
        warn!("bootstrap refused: users already exist");
        return Err(RegistryError::Forbidden {
            permission: "bootstrap".to_string(),
        });
    }

    let admin = user.admin();
    let session = Session::for_user(admin.to_session_user());
    let policy = PermissionPolicy::new();
    let saved = RegistryService::new(conn, &session, &policy).save_user(admin, password, confirmation)?;

    info!(cpf = %saved.cpf, "administrator bootstrapped");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BiddingModality, Entity};
    use crate::permissions::{PermissionSet, SessionUser};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn session(is_admin: bool, perms: &[&str]) -> Session {
        Session::for_user(SessionUser {
            name: "Operador".to_string(),
            cpf: "11144477735".to_string(),
            is_admin,
            permissions: PermissionSet::from_strings(perms.iter().copied()),
        })
    }

    #[test]
    fn test_create_then_duplicate() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let first = reg.create(Entity::sample("11.222.333/0001-81")).unwrap();
        assert!(!first.id().is_empty());

        let err = reg.create(Entity::sample("11222333000181")).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(reg.list::<Entity>().unwrap().len(), 1);
    }

    #[test]
    fn test_update_excludes_self() {
        let conn = test_db();
        let s = session(false, &["all"]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let mut a = reg.create(Entity::sample("11.222.333/0001-81")).unwrap();
        let b = reg.create(Entity::sample("11.444.777/0001-61")).unwrap();

        a.notes = "revisado".to_string();
        let a = reg.update(a).unwrap();
        assert_eq!(reg.get::<Entity>(a.id()).unwrap().notes, "revisado");

        let mut clash = b.clone();
        clash.cnpj = a.cnpj.clone();
        assert!(reg.update(clash).unwrap_err().is_duplicate());
    }

    #[test]
    fn test_create_ignores_caller_identity() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let a = reg.create(Entity::sample("11.222.333/0001-81")).unwrap();

        let mut b = Entity::sample("11.444.777/0001-61");
        b.meta.id = a.id().to_string();
        b.meta.created_at = Some(chrono::Utc::now() - chrono::Duration::days(365));
        let b = reg.create(b).unwrap();

        assert_ne!(b.id(), a.id());
        assert!(b.meta.created_at.unwrap() >= a.meta.created_at.unwrap());
        assert_eq!(reg.get::<Entity>(a.id()).unwrap().cnpj, "11.222.333/0001-81");
        assert_eq!(reg.list::<Entity>().unwrap().len(), 2);
    }

    #[test]
    fn test_create_rejects_repeated_child_rows() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let mut m = Municipality::new("Campinas", "3509502", 1_139_047, 90.0);
        m.linked_entities
            .push(LinkedEntity::new("11.222.333/0001-81", "Prefeitura", "Prefeitura"));
        m.linked_entities
            .push(LinkedEntity::new("11222333000181", "Prefeitura", "Prefeitura"));
        match reg.create(m).unwrap_err() {
            RegistryError::Validation(errors) => {
                assert_eq!(errors[0].field, "linked_entities[1].cnpj")
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut sys = System::new("RH", "Recursos Humanos", "Folha de pagamento");
        sys.modules.push(SystemModule::new("Folha", "Cálculo"));
        sys.modules.push(SystemModule::new("FOLHA", "Outro cálculo"));
        assert_eq!(reg.create(sys).unwrap_err().code(), "VALIDATION_ERROR");

        assert_eq!(db::count_records(&conn, RegistryKind::Municipality).unwrap(), 0);
        assert_eq!(db::count_records(&conn, RegistryKind::System).unwrap(), 0);
    }

    #[test]
    fn test_update_rejects_repeated_child_rows() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let mut sys = reg
            .create(System::new("RH", "Recursos Humanos", "Folha de pagamento"))
            .unwrap();
        sys.modules.push(SystemModule::new("Ponto", "Controle de ponto"));
        sys.modules.push(SystemModule::new("ponto", "Outro controle"));
        assert_eq!(reg.update(sys).unwrap_err().code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_update_unknown_id() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let mut e = Entity::sample("11.222.333/0001-81");
        e.meta.id = "missing".to_string();
        assert_eq!(reg.update(e).unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_view_only_cannot_write() {
        let conn = test_db();
        let s = session(false, &["view"]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let err = reg.create(Entity::sample("11.222.333/0001-81")).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(reg.list::<Entity>().unwrap().is_empty());
    }

    #[test]
    fn test_policy_grants_write() {
        let conn = test_db();
        let s = session(false, &["view"]);
        let policy = PermissionPolicy::new()
            .with_role("clerk", &[Permission::Create])
            .with_assignment("111.444.777-35", "clerk");
        let reg = RegistryService::new(&conn, &s, &policy);
        assert!(reg.create(Entity::sample("11.222.333/0001-81")).is_ok());
    }

    #[test]
    fn test_invalid_record_is_validation_error() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let err = reg.create(BiddingModality::new("ab", "")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_delete_and_history() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let e = reg.create(Entity::sample("11.222.333/0001-81")).unwrap();
        reg.delete(RegistryKind::Entity, e.id()).unwrap();
        assert_eq!(
            reg.delete(RegistryKind::Entity, e.id()).unwrap_err().code(),
            "NOT_FOUND"
        );

        let history = reg.history(RegistryKind::Entity, e.id()).unwrap();
        let types: Vec<&str> = history.iter().map(|ev| ev.event_type.as_str()).collect();
        assert!(types.contains(&"created"));
        assert!(types.contains(&"deleted"));
    }

    #[test]
    fn test_search_and_print() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        reg.create(BiddingModality::new("Pregão Eletrônico", "")).unwrap();
        reg.create(BiddingModality::new("Concorrência", "")).unwrap();

        assert_eq!(reg.search::<BiddingModality>("PREGÃO").unwrap().len(), 1);
        assert_eq!(reg.search::<BiddingModality>("").unwrap().len(), 2);

        let mut out = Vec::new();
        let rows = reg.print::<BiddingModality, _>(&mut out, None).unwrap();
        assert_eq!(rows, 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("Concorrência"));
    }

    #[test]
    fn test_listing_by_runtime_kind() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        reg.create(Entity::sample("11.222.333/0001-81")).unwrap();
        let listing = reg.listing(RegistryKind::Entity, "").unwrap();
        assert_eq!(listing.columns.len(), Entity::columns().len());
        assert_eq!(listing.rows.len(), 1);
        assert!(reg.listing(RegistryKind::Contract, "").unwrap().rows.is_empty());
        assert!(reg.duplicates_of(RegistryKind::Entity).unwrap().is_empty());
    }

    #[test]
    fn test_validate_json() {
        let ok = serde_json::json!({"description": "Pregão", "notes": ""});
        assert!(validate_json(RegistryKind::BiddingModality, ok).is_ok());

        let short = serde_json::json!({"description": "ab"});
        let err = validate_json(RegistryKind::BiddingModality, short).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let malformed = serde_json::json!({"population": "many"});
        match validate_json(RegistryKind::Municipality, malformed).unwrap_err() {
            RegistryError::Validation(errors) => assert_eq!(errors[0].field, "body"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_contract_sequence_assigned() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let a = reg.create(Contract::sample("001", "2024")).unwrap();
        let mut preset = Contract::sample("002", "2024");
        preset.sequence = "00001".to_string();
        let b = reg.create(preset).unwrap();
        assert_eq!(a.sequence, "00001");
        assert_eq!(b.sequence, "00002");

        let err = reg.create(Contract::sample("001", "2024")).unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_link_entity_unique_per_municipality() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let m = reg
            .create(Municipality::new("Campinas", "3509502", 1_139_047, 90.0))
            .unwrap();
        let link = LinkedEntity::new("11.222.333/0001-81", "Prefeitura", "Prefeitura");
        reg.link_entity(m.id(), link.clone()).unwrap();
        assert!(reg.link_entity(m.id(), link).unwrap_err().is_duplicate());

        let stored: Municipality = reg.get(m.id()).unwrap();
        assert_eq!(stored.linked_entities.len(), 1);
    }

    #[test]
    fn test_add_module() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let sys = reg
            .create(System::new("RH", "Recursos Humanos", "Folha de pagamento"))
            .unwrap();
        reg.add_module(sys.id(), SystemModule::new("Folha", "Cálculo"))
            .unwrap();
        let err = reg
            .add_module(sys.id(), SystemModule::new("folha", "Outro"))
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_edit_only_user_can_add_nested_rows() {
        let conn = test_db();
        let admin = session(true, &[]);
        let policy = PermissionPolicy::new();
        let sys = RegistryService::new(&conn, &admin, &policy)
            .create(System::new("RH", "Recursos Humanos", "Folha de pagamento"))
            .unwrap();

        let editor = session(false, &["edit"]);
        let reg = RegistryService::new(&conn, &editor, &policy);
        assert!(reg.get::<System>(sys.id()).is_err());
        reg.add_module(sys.id(), SystemModule::new("Folha", "Cálculo"))
            .unwrap();

        let stored: System = db::get_record(&conn, sys.id()).unwrap().unwrap();
        assert_eq!(stored.modules.len(), 1);
    }

    #[test]
    fn test_contract_sub_tables() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);
        let c = reg.create(Contract::sample("001", "2024")).unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let entity = ContractEntity::new("Prefeitura", "11.222.333/0001-81", "Prefeitura");
        reg.add_contract_entity(c.id(), entity).unwrap();
        let again = ContractEntity::new("Prefeitura", "11222333000181", "Prefeitura");
        assert!(reg.add_contract_entity(c.id(), again).unwrap_err().is_duplicate());

        reg.add_contract_system(c.id(), ContractSystem::new("SIAFIC", "Contabilidade", 4_000.0))
            .unwrap();
        let repeated = ContractSystem::new("siafic", "Outro", 1.0);
        assert!(reg.add_contract_system(c.id(), repeated).unwrap_err().is_duplicate());

        let spreadsheet =
            ContractDocument::new(date, "Planilha", "valores.xlsx", "application/vnd.ms-excel", 10);
        assert_eq!(
            reg.add_document(c.id(), spreadsheet).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        let signed =
            ContractDocument::new(date, "Contrato assinado", "contrato.pdf", "application/pdf", 52_000);
        let doc_id = reg.add_document(c.id(), signed).unwrap();

        let stored: Contract = reg.get(c.id()).unwrap();
        assert_eq!(stored.entities.len(), 1);
        assert_eq!(stored.systems.len(), 1);
        assert_eq!(stored.documents.len(), 1);
        assert_eq!(stored.sequence, c.sequence);

        reg.remove_document(c.id(), &doc_id).unwrap();
        assert_eq!(
            reg.remove_document(c.id(), &doc_id).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_save_user_password_rules() {
        let conn = test_db();
        let s = session(true, &[]);
        let policy = PermissionPolicy::new();
        let reg = RegistryService::new(&conn, &s, &policy);

        let user = User::new("Ana", "111.444.777-35", "01/01/1990");
        let err = reg.save_user(user.clone(), "", "").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let saved = reg.save_user(user, "segredo1", "segredo1").unwrap();
        assert!(saved.password_hash.starts_with("$argon2"));
        let hash = saved.password_hash.clone();

        let mut edited = saved.clone();
        edited.password_hash.clear();
        edited.name = "Ana Maria".to_string();
        let edited = reg.save_user(edited, "", "").unwrap();
        assert_eq!(edited.password_hash, hash);
        assert_eq!(edited.name, "Ana Maria");
    }

    #[test]
    fn test_bootstrap_admin_only_once() {
        let conn = test_db();
        let user = User::new("Admin", "111.444.777-35", "01/01/1980");
        let admin = bootstrap_admin(&conn, user, "segredo1", "segredo1").unwrap();
        assert!(admin.is_admin);

        let again = User::new("Outro", "529.982.247-25", "01/01/1980");
        let err = bootstrap_admin(&conn, again, "segredo1", "segredo1").unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
