use holdmap_scanner::identity::Identity;
use holdmap_scanner::source::{
    Attributes, DataSource, EntityRecord, PartnerMatch, PartnerQuery, RelationRow,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, Result, Row, params, params_from_iter};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Columns of the `empresas` table, in registry order.
pub const COMPANY_COLUMNS: [&str; 32] = [
    "cnpj",
    "matriz_filial",
    "razao_social",
    "nome_fantasia",
    "situacao",
    "data_situacao",
    "motivo_situacao",
    "nm_cidade_exterior",
    "cod_pais",
    "nome_pais",
    "cod_nat_juridica",
    "data_inicio_ativ",
    "cnae_fiscal",
    "tipo_logradouro",
    "logradouro",
    "numero",
    "complemento",
    "bairro",
    "cep",
    "uf",
    "cod_municipio",
    "municipio",
    "email",
    "qualif_resp",
    "capital_social",
    "porte",
    "opc_simples",
    "data_opc_simples",
    "data_exc_simples",
    "opc_mei",
    "sit_especial",
    "data_sit_especial",
];

const RELATION_COLUMNS: &str =
    "cnpj, tipo_socio, cnpj_cpf_socio, nome_socio, cod_qualificacao, data_entrada";

/// Registry database holding companies (`empresas`) and their partners
/// (`socios`).
pub struct Database {
    conn: Connection,
}

/// One row of the `socios` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PartnerRecord {
    pub cnpj: String,
    pub partner_type: i64,
    pub partner_tax_id: String,
    pub partner_name: String,
    pub qualification_code: String,
    pub entry_date: Option<String>,
}

impl PartnerRecord {
    /// `partner` holds a stake in company `cnpj`.
    pub fn new(cnpj: &str, partner: &Identity, qualification_code: &str, entry_date: Option<&str>) -> Self {
        let partner_name = match partner {
            Identity::NaturalPerson { name, .. } => name.clone(),
            Identity::LegalEntity { .. } => String::new(),
        };

        Self {
            cnpj: cnpj.to_string(),
            partner_type: partner.partner_type(),
            partner_tax_id: partner.tax_id().to_string(),
            partner_name,
            qualification_code: qualification_code.to_string(),
            entry_date: entry_date.map(str::to_string),
        }
    }
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Companies, one row per tax id
            CREATE TABLE IF NOT EXISTS empresas (
    cnpj TEXT PRIMARY KEY,
    matriz_filial TEXT,
    razao_social TEXT,
    nome_fantasia TEXT,
    situacao TEXT,
    data_situacao TEXT,
    motivo_situacao TEXT,
    nm_cidade_exterior TEXT,
    cod_pais TEXT,
    nome_pais TEXT,
    cod_nat_juridica TEXT,
    data_inicio_ativ TEXT,
    cnae_fiscal TEXT,

    -- Address
    tipo_logradouro TEXT,
    logradouro TEXT,
    numero TEXT,
    complemento TEXT,
    bairro TEXT,
    cep TEXT,
    uf TEXT,
    cod_municipio TEXT,
    municipio TEXT,
    email TEXT,

    qualif_resp TEXT,
    capital_social REAL,
    porte TEXT,
    opc_simples TEXT,
    data_opc_simples TEXT,
    data_exc_simples TEXT,
    opc_mei TEXT,
    sit_especial TEXT,
    data_sit_especial TEXT
);

-- Partners: tipo_socio 1 = company, 2 = person, 3 = foreign
CREATE TABLE IF NOT EXISTS socios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cnpj TEXT NOT NULL,
    tipo_socio INTEGER NOT NULL,
    cnpj_cpf_socio TEXT,
    nome_socio TEXT,
    cod_qualificacao TEXT,
    data_entrada TEXT
);

CREATE INDEX IF NOT EXISTS idx_socios_cnpj ON socios(cnpj);
CREATE INDEX IF NOT EXISTS idx_socios_cnpj_cpf_socio ON socios(cnpj_cpf_socio);
CREATE INDEX IF NOT EXISTS idx_socios_nome_socio ON socios(nome_socio);
            ",
        )?;
        Ok(())
    }

    /// Insert or replace a company. `fields` keys must be `empresas` columns.
    pub fn insert_company(&self, cnpj: &str, fields: &Attributes) -> Result<()> {
        let mut columns = vec!["cnpj"];
        let mut values = vec![SqlValue::Text(cnpj.to_string())];

        for (column, value) in fields {
            if column == "cnpj" {
                continue;
            }
            let Some(known) = COMPANY_COLUMNS.iter().find(|c| **c == column.as_str()) else {
                return Err(rusqlite::Error::InvalidColumnName(column.clone()));
            };
            columns.push(*known);
            values.push(sql_value(value));
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO empresas ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn insert_partner(&self, partner: &PartnerRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO socios (cnpj, tipo_socio, cnpj_cpf_socio, nome_socio, cod_qualificacao, data_entrada)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &partner.cnpj,
                partner.partner_type,
                &partner.partner_tax_id,
                &partner.partner_name,
                &partner.qualification_code,
                &partner.entry_date,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn company_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM empresas", [], |row| row.get(0))
    }

    pub fn partner_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM socios", [], |row| row.get(0))
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

impl DataSource for Database {
    type Error = rusqlite::Error;

    fn fetch_entity_attributes(&self, tax_id: &str) -> Result<Option<EntityRecord>> {
        let sql = format!(
            "SELECT {} FROM empresas WHERE cnpj = ?1 LIMIT 1",
            COMPANY_COLUMNS.join(", ")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        stmt.query_row(params![tax_id], |row| {
            let mut fields = Attributes::new();
            for (idx, column) in COMPANY_COLUMNS.iter().enumerate() {
                fields.insert(column.to_string(), json_value(row.get_ref(idx)?));
            }
            let text = |column: &str| fields.get(column).and_then(Value::as_str).map(str::to_string);
            let legal_name = text("razao_social");
            let trade_name = text("nome_fantasia");

            Ok(EntityRecord {
                tax_id: tax_id.to_string(),
                legal_name,
                trade_name,
                fields,
            })
        })
        .optional()
    }

    fn fetch_relations(&self, identity: &Identity) -> Result<Vec<RelationRow>> {
        debug!("Querying relations of {}", identity);

        let rows = match identity {
            // A company may be the owned party or a partner of another company
            Identity::LegalEntity { tax_id } => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    "SELECT {} FROM socios WHERE cnpj = ?1 OR cnpj_cpf_socio = ?1 ORDER BY id",
                    RELATION_COLUMNS
                ))?;
                stmt.query_map(params![tax_id], relation_row)?
                    .collect::<Result<Vec<_>>>()?
            }
            Identity::NaturalPerson { tax_id, name } => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    "SELECT {} FROM socios WHERE cnpj_cpf_socio = ?1 AND nome_socio = ?2 ORDER BY id",
                    RELATION_COLUMNS
                ))?;
                stmt.query_map(params![tax_id, name], relation_row)?
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(rows)
    }

    fn search_partners(&self, query: &PartnerQuery) -> Result<Vec<PartnerMatch>> {
        let filter = match query {
            PartnerQuery::TaxId(_) => "cnpj_cpf_socio = ?1",
            PartnerQuery::Name(_) => "nome_socio = ?1",
        };
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT tipo_socio, cnpj_cpf_socio, nome_socio FROM socios
             WHERE {}
             GROUP BY tipo_socio, cnpj_cpf_socio, nome_socio
             ORDER BY MIN(id)",
            filter
        ))?;

        let matches = stmt
            .query_map(params![query.value()], |row| {
                let partner_type: i64 = row.get(0)?;
                let tax_id: Option<String> = row.get(1)?;
                let name: Option<String> = row.get(2)?;
                Ok(PartnerMatch {
                    identity: Identity::from_partner_columns(
                        partner_type,
                        tax_id.as_deref().unwrap_or_default(),
                        name.as_deref().unwrap_or_default(),
                    ),
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(matches)
    }
}

fn relation_row(row: &Row<'_>) -> Result<RelationRow> {
    let owned_tax_id: String = row.get(0)?;
    let partner_type: i64 = row.get(1)?;
    let partner_tax_id: Option<String> = row.get(2)?;
    let partner_name: Option<String> = row.get(3)?;
    let qualification_code: Option<String> = row.get(4)?;

    Ok(RelationRow {
        owned_tax_id,
        partner: Identity::from_partner_columns(
            partner_type,
            partner_tax_id.as_deref().unwrap_or_default(),
            partner_name.as_deref().unwrap_or_default(),
        ),
        qualification_code: qualification_code.unwrap_or_default(),
        entry_date: row.get(5)?,
    })
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(text) | ValueRef::Blob(text) => {
            Value::from(String::from_utf8_lossy(text).into_owned())
        }
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
