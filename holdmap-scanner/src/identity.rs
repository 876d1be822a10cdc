use serde::{Deserialize, Serialize};
use std::fmt;

/// Partner type code for a legal entity in the registry's `tipo_socio` column.
pub const PARTNER_TYPE_LEGAL_ENTITY: i64 = 1;
/// Partner type code for a natural person.
pub const PARTNER_TYPE_NATURAL_PERSON: i64 = 2;

/// Trade name values the registry uses when a company has no trade name.
const PLACEHOLDER_NAMES: [&str; 3] = ["", "NONE", "NAO POSSUI"];

/// A party that can take part in an ownership relation.
///
/// Natural persons are identified by the pair (tax id, name) because the
/// registry masks part of their tax id, so the tax id alone is not unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    LegalEntity { tax_id: String },
    NaturalPerson { tax_id: String, name: String },
}

impl Identity {
    pub fn legal_entity(tax_id: impl Into<String>) -> Self {
        Identity::LegalEntity {
            tax_id: tax_id.into(),
        }
    }

    pub fn natural_person(tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        Identity::NaturalPerson {
            tax_id: tax_id.into(),
            name: name.into(),
        }
    }

    /// Build an identity from the partner columns of a relation row.
    ///
    /// Only type 1 is a legal entity; every other code (persons, foreigners)
    /// is keyed by tax id and name.
    pub fn from_partner_columns(partner_type: i64, tax_id: &str, name: &str) -> Self {
        if partner_type == PARTNER_TYPE_LEGAL_ENTITY {
            Identity::legal_entity(tax_id)
        } else {
            Identity::natural_person(tax_id, name)
        }
    }

    /// The graph key for this identity.
    pub fn key(&self) -> String {
        match self {
            Identity::LegalEntity { tax_id } => tax_id.clone(),
            Identity::NaturalPerson { tax_id, name } => format!("{}{}", tax_id, name),
        }
    }

    pub fn tax_id(&self) -> &str {
        match self {
            Identity::LegalEntity { tax_id } | Identity::NaturalPerson { tax_id, .. } => tax_id,
        }
    }

    pub fn is_legal_entity(&self) -> bool {
        matches!(self, Identity::LegalEntity { .. })
    }

    /// Registry partner type code (1 for legal entities, 2 for persons).
    pub fn partner_type(&self) -> i64 {
        match self {
            Identity::LegalEntity { .. } => PARTNER_TYPE_LEGAL_ENTITY,
            Identity::NaturalPerson { .. } => PARTNER_TYPE_NATURAL_PERSON,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Identity::LegalEntity { .. } => "legal_entity",
            Identity::NaturalPerson { .. } => "natural_person",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::LegalEntity { tax_id } => write!(f, "PJ {}", tax_id),
            Identity::NaturalPerson { tax_id, name } => write!(f, "PF {} {}", tax_id, name),
        }
    }
}

/// Pick the name shown for a company: the trade name unless it is blank or a
/// placeholder, otherwise the registered name.
pub fn preferred_name(trade_name: Option<&str>, legal_name: Option<&str>) -> Option<String> {
    let trade_name = trade_name.map(str::trim).filter(|name| !is_placeholder_name(name));

    trade_name
        .or_else(|| legal_name.map(str::trim).filter(|name| !name.is_empty()))
        .map(str::to_string)
}

fn is_placeholder_name(name: &str) -> bool {
    PLACEHOLDER_NAMES
        .iter()
        .any(|placeholder| name.eq_ignore_ascii_case(placeholder))
}
