// Tests for the registry database and its data source queries

use holdmap_core::data::{Database, PartnerRecord};
use holdmap_scanner::Identity;
use holdmap_scanner::source::{Attributes, DataSource, PartnerQuery};
use serde_json::{Value, json};
use tempfile::TempDir;

const HOLDING: &str = "11111111000111";
const SUBSIDIARY: &str = "22222222000122";
const PERSON_TAX_ID: &str = "***123456**";
const PERSON_NAME: &str = "JOAO DA SILVA";

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn company_fields(legal_name: &str, trade_name: &str) -> Attributes {
    let mut fields = Attributes::new();
    fields.insert("razao_social".to_string(), json!(legal_name));
    fields.insert("nome_fantasia".to_string(), json!(trade_name));
    fields.insert("situacao".to_string(), json!("02"));
    fields.insert("capital_social".to_string(), json!(1500.5));
    fields
}

/// Holding owns the subsidiary; a person is partner of the holding.
fn seed_registry(db: &Database) {
    db.insert_company(HOLDING, &company_fields("HOLDING ALFA SA", "ALFA"))
        .unwrap();
    db.insert_company(SUBSIDIARY, &company_fields("BETA COMERCIO LTDA", ""))
        .unwrap();

    let person = Identity::natural_person(PERSON_TAX_ID, PERSON_NAME);
    db.insert_partner(&PartnerRecord::new(HOLDING, &person, "49", Some("20100105")))
        .unwrap();
    db.insert_partner(&PartnerRecord::new(
        SUBSIDIARY,
        &Identity::legal_entity(HOLDING),
        "22",
        None,
    ))
    .unwrap();
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_exists_and_drop() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    assert!(!Database::exists(&db_path));
    let db = Database::new(&db_path).unwrap();
    assert!(Database::exists(&db_path));
    drop(db);

    Database::drop(&db_path).unwrap();
    assert!(!Database::exists(&db_path));
}

#[test]
fn test_reopen_keeps_rows() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let db = Database::new(&db_path).unwrap();
        seed_registry(&db);
    }

    let db = Database::new(&db_path).unwrap();
    assert_eq!(db.company_count().unwrap(), 2);
    assert_eq!(db.partner_count().unwrap(), 2);
}

// ============================================================================
// Insert Tests
// ============================================================================

#[test]
fn test_insert_company_rejects_unknown_column() {
    let (_temp_dir, db) = create_test_db();

    let mut fields = Attributes::new();
    fields.insert("not_a_column".to_string(), json!("x"));

    assert!(db.insert_company(HOLDING, &fields).is_err());
    assert_eq!(db.company_count().unwrap(), 0);
}

#[test]
fn test_insert_company_replaces_existing_row() {
    let (_temp_dir, db) = create_test_db();

    db.insert_company(HOLDING, &company_fields("OLD NAME", "")).unwrap();
    db.insert_company(HOLDING, &company_fields("NEW NAME", "")).unwrap();

    assert_eq!(db.company_count().unwrap(), 1);
    let record = db.fetch_entity_attributes(HOLDING).unwrap().unwrap();
    assert_eq!(record.legal_name.as_deref(), Some("NEW NAME"));
}

#[test]
fn test_partner_record_from_identity() {
    let person = Identity::natural_person(PERSON_TAX_ID, PERSON_NAME);
    let record = PartnerRecord::new(HOLDING, &person, "49", None);
    assert_eq!(record.partner_type, 2);
    assert_eq!(record.partner_tax_id, PERSON_TAX_ID);
    assert_eq!(record.partner_name, PERSON_NAME);

    let company = PartnerRecord::new(SUBSIDIARY, &Identity::legal_entity(HOLDING), "22", None);
    assert_eq!(company.partner_type, 1);
    assert_eq!(company.partner_name, "");
}

// ============================================================================
// Data Source Tests
// ============================================================================

#[test]
fn test_fetch_entity_attributes() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    let record = db.fetch_entity_attributes(HOLDING).unwrap().unwrap();
    assert_eq!(record.tax_id, HOLDING);
    assert_eq!(record.legal_name.as_deref(), Some("HOLDING ALFA SA"));
    assert_eq!(record.trade_name.as_deref(), Some("ALFA"));
    assert_eq!(record.fields.get("situacao"), Some(&json!("02")));
    assert_eq!(record.fields.get("capital_social"), Some(&json!(1500.5)));
    // Every column is present, unset ones as null
    assert_eq!(record.fields.get("email"), Some(&Value::Null));
}

#[test]
fn test_fetch_entity_attributes_missing() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    assert!(db.fetch_entity_attributes("99999999000199").unwrap().is_none());
}

#[test]
fn test_fetch_relations_of_company_both_directions() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    let rows = db.fetch_relations(&Identity::legal_entity(HOLDING)).unwrap();
    assert_eq!(rows.len(), 2);

    // Partner of the holding
    assert_eq!(rows[0].owned_tax_id, HOLDING);
    assert_eq!(
        rows[0].partner,
        Identity::natural_person(PERSON_TAX_ID, PERSON_NAME)
    );
    assert_eq!(rows[0].qualification_code, "49");
    assert_eq!(rows[0].entry_date.as_deref(), Some("20100105"));

    // Stake the holding has in the subsidiary
    assert_eq!(rows[1].owned_tax_id, SUBSIDIARY);
    assert_eq!(rows[1].partner, Identity::legal_entity(HOLDING));
    assert_eq!(rows[1].entry_date, None);
}

#[test]
fn test_fetch_relations_of_person_matches_name() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    // Same masked tax id, different person
    let homonym = Identity::natural_person(PERSON_TAX_ID, "MARIA SOUZA");
    db.insert_partner(&PartnerRecord::new(SUBSIDIARY, &homonym, "49", None))
        .unwrap();

    let rows = db
        .fetch_relations(&Identity::natural_person(PERSON_TAX_ID, PERSON_NAME))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].owned_tax_id, HOLDING);
}

#[test]
fn test_search_partners_by_name() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);
    // A second stake by the same person is grouped into one match
    let person = Identity::natural_person(PERSON_TAX_ID, PERSON_NAME);
    db.insert_partner(&PartnerRecord::new(SUBSIDIARY, &person, "49", None))
        .unwrap();

    let matches = db
        .search_partners(&PartnerQuery::parse("joao da silva"))
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].identity, person);
}

#[test]
fn test_search_partners_by_tax_id() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    let matches = db
        .search_partners(&PartnerQuery::parse("11.111.111/0001-11"))
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].identity, Identity::legal_entity(HOLDING));
}

#[test]
fn test_search_partners_no_match() {
    let (_temp_dir, db) = create_test_db();
    seed_registry(&db);

    let matches = db.search_partners(&PartnerQuery::parse("NOBODY")).unwrap();
    assert!(matches.is_empty());
}
