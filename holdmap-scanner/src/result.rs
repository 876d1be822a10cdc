use crate::graph::GraphStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The registry has no company row for the tax id.
    NotFound,
    /// The data source call failed; that branch was abandoned.
    AdapterFailure,
}

/// Non-fatal problem recorded during a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Node key, or `search:<query>` for a failed partner search.
    pub key: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Source calls made during a crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub attribute_fetches: usize,
    pub relation_fetches: usize,
    pub partner_searches: usize,
    /// Calls to `expand`, including revisits that stop early.
    pub visits: usize,
}

#[derive(Debug)]
pub struct CrawlResult {
    pub graph: GraphStore,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CrawlStats,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl CrawlResult {
    pub fn not_found_count(&self) -> usize {
        self.count(DiagnosticKind::NotFound)
    }

    pub fn failure_count(&self) -> usize {
        self.count(DiagnosticKind::AdapterFailure)
    }

    fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}
