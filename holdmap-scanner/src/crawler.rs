use crate::error::{CrawlError, Result};
use crate::graph::{ExpansionState, GraphStore, Upsert};
use crate::identity::{preferred_name, Identity};
use crate::result::{CrawlResult, CrawlStats, Diagnostic, DiagnosticKind};
use crate::source::{Attributes, DataSource, PartnerQuery};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Called with (depth, node key) each time a node is visited.
/// Prefix of diagnostic keys for failed partner searches, which have no node.
pub const SEARCH_KEY_PREFIX: &str = "search:";

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Which qualification codes an ownership relation must carry to be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QualificationFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl QualificationFilter {
    /// Parse `ALL` (or `TODAS`, or an empty string) or a comma separated list
    /// of codes.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") || value.eq_ignore_ascii_case("todas")
        {
            return QualificationFilter::All;
        }

        let codes = value
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
        QualificationFilter::Only(codes)
    }

    pub fn allows(&self, code: &str) -> bool {
        match self {
            QualificationFilter::All => true,
            QualificationFilter::Only(codes) => codes.contains(code),
        }
    }
}

/// Recursive, depth-bounded expander of ownership relations.
///
/// The crawler owns the graph for the whole session and is its only writer.
/// Data source failures abort the branch they happen in and are kept as
/// diagnostics; cancellation unwinds the whole crawl but keeps the graph.
pub struct Crawler<S: DataSource> {
    source: S,
    graph: GraphStore,
    diagnostics: Vec<Diagnostic>,
    stats: CrawlStats,
    max_depth: usize,
    qualifications: QualificationFilter,
    cancel_flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    progress_callback: Option<ProgressCallback>,
    started: Instant,
    cancelled: bool,
}

impl<S: DataSource> Crawler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            graph: GraphStore::new(),
            diagnostics: Vec::new(),
            stats: CrawlStats::default(),
            max_depth: 1,
            qualifications: QualificationFilter::All,
            cancel_flag: None,
            deadline: None,
            progress_callback: None,
            started: Instant::now(),
            cancelled: false,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_qualifications(mut self, qualifications: QualificationFilter) -> Self {
        self.qualifications = qualifications;
        self
    }

    /// Stop the crawl once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Stop the crawl once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Add a root identity at depth 0 and expand it.
    ///
    /// Only cancellation and configuration errors are returned; data source
    /// failures end up in [`Crawler::diagnostics`].
    pub fn insert(&mut self, identity: &Identity) -> Result<()> {
        self.check_config()?;
        info!("Expanding root {} (max depth {})", identity, self.max_depth);
        self.expand_branch(identity, 0, None)
    }

    /// Seed the crawl with every partner matching a tax id or a name.
    ///
    /// Returns how many partners were found; zero is not an error.
    pub fn insert_by_tax_id_or_name(&mut self, query: &PartnerQuery) -> Result<usize> {
        self.check_config()?;
        self.check_cancelled()?;

        self.stats.partner_searches += 1;
        let matches = match self.source.search_partners(query) {
            Ok(matches) => matches,
            Err(e) => {
                let key = format!("{}{}", SEARCH_KEY_PREFIX, query.value());
                self.record(CrawlError::source_failure(&key, e))?;
                return Ok(0);
            }
        };

        if matches.is_empty() {
            warn!("No partner found matching '{}'", query.value());
            return Ok(0);
        }

        info!("{} partner(s) match '{}'", matches.len(), query.value());
        for partner in &matches {
            self.insert(&partner.identity)?;
        }
        Ok(matches.len())
    }

    /// Visit `identity` at `depth`, reached from `origin`, and expand its
    /// relations when this visit can reach further than any previous one.
    pub fn expand(&mut self, identity: &Identity, depth: usize, origin: Option<&Identity>) -> Result<()> {
        self.check_cancelled()?;

        let key = identity.key();
        let upsert = self.graph.upsert_node(identity, depth);
        self.stats.visits += 1;
        debug!("Visiting {} at depth {} ({:?})", key, depth, upsert);

        if let Some(ref callback) = self.progress_callback {
            callback(depth, key.clone());
        }

        if upsert.is_new() {
            self.load_attributes(identity, &key)?;
        }

        let expandable = depth < self.max_depth
            && match upsert {
                Upsert::Created => true,
                Upsert::Existing { previous_depth, .. } => depth < previous_depth,
            };

        if !expandable {
            if upsert.is_new() {
                self.graph
                    .set_expansion_state(&key, ExpansionState::FullyBlockedByDepth)?;
            }
            return Ok(());
        }

        match upsert {
            // Relations were fetched on an earlier, deeper visit
            Upsert::Existing {
                previous_depth,
                previous_state: ExpansionState::PartiallyExpanded,
            } if previous_depth < self.max_depth => {
                self.expand_from_graph(identity, &key, depth)?;
            }
            _ => {
                self.expand_from_source(identity, &key, depth, origin)?;
            }
        }

        self.graph
            .set_expansion_state(&key, ExpansionState::PartiallyExpanded)
    }

    pub fn into_result(self) -> CrawlResult {
        info!(
            "Crawl complete. {} nodes, {} edges, {} diagnostics",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.diagnostics.len()
        );

        CrawlResult {
            graph: self.graph,
            diagnostics: self.diagnostics,
            stats: self.stats,
            cancelled: self.cancelled,
            elapsed: self.started.elapsed(),
        }
    }

    /// Re-walk neighbors already in the graph so the shorter path lowers
    /// their depth, without querying the source again.
    fn expand_from_graph(&mut self, identity: &Identity, key: &str, depth: usize) -> Result<()> {
        debug!("Reusing known relations of {}", key);

        let mut neighbors = self.graph.predecessors_of(key);
        neighbors.extend(self.graph.successors_of(key));

        for neighbor_key in neighbors {
            let Some(neighbor) = self.graph.get_node(&neighbor_key).map(|n| n.identity.clone())
            else {
                continue;
            };
            self.expand_branch(&neighbor, depth + 1, Some(identity))?;
        }
        Ok(())
    }

    fn expand_from_source(
        &mut self,
        identity: &Identity,
        key: &str,
        depth: usize,
        origin: Option<&Identity>,
    ) -> Result<()> {
        self.check_cancelled()?;
        self.stats.relation_fetches += 1;
        let rows = self
            .source
            .fetch_relations(identity)
            .map_err(|e| CrawlError::source_failure(key, e))?;
        debug!("{} relation(s) for {}", rows.len(), key);

        for row in rows {
            if !self.qualifications.allows(&row.qualification_code) {
                continue;
            }

            let owned = row.owned();
            let is_owned_party = owned == *identity;
            let counterparty = if is_owned_party {
                row.partner.clone()
            } else {
                owned.clone()
            };

            // Never walk straight back along the edge that led here
            if origin == Some(&counterparty) {
                continue;
            }

            self.expand_branch(&counterparty, depth + 1, Some(identity))?;

            let owner_key = if is_owned_party {
                row.partner.key()
            } else {
                key.to_string()
            };
            self.graph.add_edge(
                &owner_key,
                &owned.key(),
                &row.qualification_code,
                row.entry_date.as_deref(),
            )?;
        }
        Ok(())
    }

    fn load_attributes(&mut self, identity: &Identity, key: &str) -> Result<()> {
        match identity {
            Identity::NaturalPerson { tax_id, .. } => {
                let mut attributes = Attributes::new();
                attributes.insert("tax_id".to_string(), Value::from(tax_id.as_str()));
                self.graph.set_attributes(key, attributes)
            }
            Identity::LegalEntity { tax_id } => {
                self.check_cancelled()?;
                self.stats.attribute_fetches += 1;
                let record = self
                    .source
                    .fetch_entity_attributes(tax_id)
                    .map_err(|e| CrawlError::source_failure(key, e))?;

                match record {
                    Some(record) => {
                        let name = preferred_name(
                            record.trade_name.as_deref(),
                            record.legal_name.as_deref(),
                        );
                        self.graph.set_display_name(key, name)?;
                        self.graph.set_attributes(key, record.fields)
                    }
                    None => {
                        warn!("Company not found: {}", key);
                        self.diagnostics.push(Diagnostic {
                            key: key.to_string(),
                            kind: DiagnosticKind::NotFound,
                            message: format!("Company not found: {}", tax_id),
                        });
                        Ok(())
                    }
                }
            }
        }
    }

    /// Expand one branch, turning data source failures into diagnostics.
    fn expand_branch(&mut self, identity: &Identity, depth: usize, origin: Option<&Identity>) -> Result<()> {
        match self.expand(identity, depth, origin) {
            Ok(()) => Ok(()),
            Err(e) => self.record(e),
        }
    }

    fn record(&mut self, error: CrawlError) -> Result<()> {
        match error {
            CrawlError::Source { key, source } => {
                warn!("Abandoning branch at {}: {}", key, source);
                self.diagnostics.push(Diagnostic {
                    key,
                    kind: DiagnosticKind::AdapterFailure,
                    message: source.to_string(),
                });
                Ok(())
            }
            CrawlError::Cancelled => {
                self.cancelled = true;
                Err(CrawlError::Cancelled)
            }
            other => Err(other),
        }
    }

    fn check_config(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(CrawlError::InvalidConfig(
                "max depth must be at least 1".to_string(),
            ));
        }
        if matches!(self.qualifications, QualificationFilter::Only(ref codes) if codes.is_empty()) {
            return Err(CrawlError::InvalidConfig(
                "qualification filter has no codes".to_string(),
            ));
        }
        Ok(())
    }

    fn check_cancelled(&mut self) -> Result<()> {
        let flagged = self
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);

        if flagged || expired {
            self.cancelled = true;
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        }
    }
}
