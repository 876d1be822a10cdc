use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive fields attached to a node, keyed by column name.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A company row from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub tax_id: String,
    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
    /// Every column of the row, including the three above.
    pub fields: Attributes,
}

/// One partnership row: `partner` holds a stake in the company `owned_tax_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRow {
    pub owned_tax_id: String,
    pub partner: Identity,
    pub qualification_code: String,
    pub entry_date: Option<String>,
}

impl RelationRow {
    pub fn owned(&self) -> Identity {
        Identity::legal_entity(self.owned_tax_id.clone())
    }
}

/// Secondary lookup used to seed a crawl from a partial identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerQuery {
    TaxId(String),
    Name(String),
}

impl PartnerQuery {
    /// Classify free text: digits (optionally masked or punctuated) are a tax
    /// id, anything else is a name.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let looks_like_tax_id = value.chars().any(|c| c.is_ascii_digit())
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '*' | '.' | '-' | '/'));

        if looks_like_tax_id {
            // The registry stores tax ids without punctuation
            let digits = value
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '*')
                .collect();
            PartnerQuery::TaxId(digits)
        } else {
            PartnerQuery::Name(value.to_uppercase())
        }
    }

    pub fn value(&self) -> &str {
        match self {
            PartnerQuery::TaxId(value) | PartnerQuery::Name(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerMatch {
    pub identity: Identity,
}

/// The relational data source the crawler reads from.
///
/// Implementations are expected to fail fast; the crawler never retries.
pub trait DataSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Company attributes by tax id, `None` when the registry has no row.
    fn fetch_entity_attributes(&self, tax_id: &str) -> Result<Option<EntityRecord>, Self::Error>;

    /// Every relation in which `identity` is the owned company or the partner.
    fn fetch_relations(&self, identity: &Identity) -> Result<Vec<RelationRow>, Self::Error>;

    /// Distinct partners matching the query.
    fn search_partners(&self, query: &PartnerQuery) -> Result<Vec<PartnerMatch>, Self::Error>;
}

impl<S: DataSource + ?Sized> DataSource for &S {
    type Error = S::Error;

    fn fetch_entity_attributes(&self, tax_id: &str) -> Result<Option<EntityRecord>, Self::Error> {
        (**self).fetch_entity_attributes(tax_id)
    }

    fn fetch_relations(&self, identity: &Identity) -> Result<Vec<RelationRow>, Self::Error> {
        (**self).fetch_relations(identity)
    }

    fn search_partners(&self, query: &PartnerQuery) -> Result<Vec<PartnerMatch>, Self::Error> {
        (**self).search_partners(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_query_parse_tax_id() {
        assert_eq!(
            PartnerQuery::parse("***123456**"),
            PartnerQuery::TaxId("***123456**".to_string())
        );
        assert_eq!(
            PartnerQuery::parse(" 11.111.111/0001-99 "),
            PartnerQuery::TaxId("11111111000199".to_string())
        );
    }

    #[test]
    fn test_partner_query_parse_name() {
        assert_eq!(
            PartnerQuery::parse("Alice Souza"),
            PartnerQuery::Name("ALICE SOUZA".to_string())
        );
        assert_eq!(
            PartnerQuery::parse("***"),
            PartnerQuery::Name("***".to_string())
        );
    }
}
